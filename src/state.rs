//! Shared application state for request handlers.

use std::sync::Arc;
use tera::Tera;

use crate::api::{EmailSource, Escrow, Links};
use crate::config::AppConfig;
use crate::fixup::{FixupMode, FixupOptions};
use crate::thread::Layout;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// Contains the application configuration, Tera template engine, the backend
/// email source and the escrow table it reports in-flight requests to.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tera: Arc<Tera>,
    pub source: Arc<dyn EmailSource>,
    pub escrow: Arc<Escrow>,
    pub links: Arc<Links>,
    /// Fixup options for the configured default mode
    pub fixup: FixupOptions,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tera: Tera,
        source: Arc<dyn EmailSource>,
        escrow: Arc<Escrow>,
        fixup: FixupOptions,
    ) -> Self {
        let links = Links::new(&config.backend);
        Self {
            config: Arc::new(config),
            tera: Arc::new(tera),
            source,
            escrow,
            links: Arc::new(links),
            fixup,
        }
    }

    /// The fixup mode from config, before per-request overrides.
    pub fn default_mode(&self) -> FixupMode {
        FixupMode {
            chatty: self.config.ui.chatty,
            compact_quotes: self.config.ui.compact_quotes,
        }
    }

    /// Build the render context for one request.
    ///
    /// The email source is scoped to `scope` when it supports it, so that
    /// concurrent requests for the same URL never supersede each other.
    pub fn render_context(&self, scope: &str, overrides: &RenderOverrides) -> RenderContext {
        let defaults = self.default_mode();
        let mode = FixupMode {
            chatty: overrides.chatty.unwrap_or(defaults.chatty),
            compact_quotes: overrides.compact_quotes.unwrap_or(defaults.compact_quotes),
        };
        let fixup = self.fixup.with_mode(mode);
        let layout = Layout::new(
            overrides.width.unwrap_or(self.config.ui.render_width),
            self.config.ui.max_nesting,
        );
        let source = self
            .source
            .with_scope(scope)
            .unwrap_or_else(|| Arc::clone(&self.source));

        RenderContext {
            source,
            fixup,
            layout,
        }
    }
}

/// Per-request changes to the configured rendering mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOverrides {
    pub chatty: Option<bool>,
    pub compact_quotes: Option<bool>,
    pub width: Option<u32>,
}

/// Everything the engines need to render one page.
#[derive(Clone)]
pub struct RenderContext {
    pub source: Arc<dyn EmailSource>,
    pub fixup: FixupOptions,
    pub layout: Layout,
}
