mod access_rules;
mod api;
mod app;
mod backup;
mod config;
mod dialog;
mod edit_commands;
mod editor;
mod lazy_assets;
mod sidebar;

use app::App;

fn main() {
    console_error_panic_hook::set_once();
    leptos::mount::mount_to_body(App);
}
