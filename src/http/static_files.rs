//! Static file serving for the stylesheet and other page assets.

use tower_http::services::ServeDir;

use crate::config::UiConfig;

/// Serve `ui.static_dir`; missing files fall through to a plain 404.
pub fn create_static_service(ui: &UiConfig) -> ServeDir {
    ServeDir::new(&ui.static_dir)
}
