//! Vitrine - glTF model viewers
//!
//! Two viewers share one renderer-agnostic core:
//!
//! - [`Viewer`] shows one glTF model under an orbit camera with environment
//!   lighting, a light rig, debug helpers and animation playback, all driven
//!   by a [`ViewerState`] a host UI can edit.
//! - [`ShowcaseSession`] places several models side by side under an
//!   arc-rotate camera, with a radio camera selector and a dose dial that
//!   scrubs an animation timeline.
//!
//! Drawing goes through a [`RenderBackend`]; [`HeadlessBackend`] records
//! what would be drawn and a WebGL2 backend draws in the browser.

#![warn(missing_docs)]

pub mod animation;
pub mod assets;
pub mod backend;
pub mod config;
pub mod dial;
pub mod environment;
pub mod error;
pub mod interaction;
pub mod primitives;
pub mod showcase;
pub mod state;
pub mod three_d;
pub mod viewer;

#[cfg(target_arch = "wasm32")]
pub mod webgl_backend;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use assets::{AssetLoader, AssetMap, AssetSource, FileSource};
pub use backend::{Frame, HeadlessBackend, RenderBackend};
pub use config::{ShowcaseConfig, ViewerOptions};
pub use dial::BoundedDial;
pub use error::{Result, ViewerError};
pub use interaction::{InteractionCoordinator, InteractionOutcome, PointerEvent};
pub use primitives::Color;
pub use showcase::ShowcaseSession;
pub use state::ViewerState;
pub use three_d::{Camera3D, Light, Material3D, Mesh3D, Scene3D};
pub use viewer::Viewer;

/// Initialize logging for the current target
///
/// Natively this installs `env_logger` (honouring `RUST_LOG`); in the browser
/// it routes `log` to the console and installs the panic hook. Calling it
/// more than once is harmless.
pub fn init_logging() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).try_init();
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        let _ = console_log::init_with_level(log::Level::Info);
    }
}
