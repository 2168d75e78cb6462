const COMMANDS: &[&str] = &[
  "purchase",
  "restore_purchases",
  "acknowledge_pending_purchases",
  "get_product_details",
  "get_connection_state",
];

fn main() {
  tauri_plugin::Builder::new(COMMANDS)
    .android_path("android")
    .build();
}
