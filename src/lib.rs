//! BSP world with portal-based visibility

/// Basic math utility
pub mod math;

/// Basic geometry
pub mod geom;

/// Typed object pool
pub mod pool;

/// View frustum
pub mod frustum;

/// World configuration
pub mod config;

/// World BSP, portals and visibility
pub mod bsp;

/// Renderer front-end
pub mod render;

pub use bsp::{World, WorldLoadError};
pub use config::{RenderFlags, WorldConfig};
