//! World build and render configuration

bitflags::bitflags! {
    /// Runtime switches of world building and rendering
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Build BSP tree, portals and debug portal geometry on load
        const BUILD_BSP_TREE = 1 << 0;

        /// Render through BSP traversal and visibility (otherwise raw triangle soup is drawn)
        const RENDER_USE_BSP = 1 << 1;

        /// Enable depth test (host renderer state)
        const DEPTH_TEST = 1 << 2;

        /// Draw portal overlay
        const DEBUG_PORTALS = 1 << 3;

        /// Draw wireframe outlines (host renderer state)
        const WIREFRAME = 1 << 4;

        /// Draw filled polygons (host renderer state)
        const SOLID = 1 << 5;
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::all().difference(Self::WIREFRAME)
    }
}

impl RenderFlags {
    /// Find flag by case-insensitive name (e.g. `debug_portals`)
    pub fn find(name: &str) -> Option<Self> {
        Self::from_name(&name.to_ascii_uppercase())
    }
}

/// Default PVS portal traversal depth limit
pub const DEFAULT_MAX_PORTAL_DEPTH: usize = 64;

/// World configuration
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorldConfig {
    /// Runtime switches
    pub flags: RenderFlags,

    /// Datafile position scale
    pub scale: f32,

    /// Maximal count of portals single PVS path may pass through
    pub max_portal_depth: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            flags: RenderFlags::default(),
            scale: 1.0,
            max_portal_depth: DEFAULT_MAX_PORTAL_DEPTH,
        }
    }
}

impl WorldConfig {
    pub fn with_flags(self, flags: RenderFlags) -> Self {
        Self { flags, ..self }
    }

    pub fn with_scale(self, scale: f32) -> Self {
        Self { scale, ..self }
    }

    pub fn with_max_portal_depth(self, max_portal_depth: usize) -> Self {
        Self { max_portal_depth, ..self }
    }
}
