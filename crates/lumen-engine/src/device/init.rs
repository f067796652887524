/// Initialization parameters for a [`Device`](super::Device).
///
/// Keep this minimal; the backend reports everything else.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Name used in log lines. Defaults to the backend's renderer string.
    pub label: Option<String>,

    /// Caps the texture-unit table below what the backend reports.
    ///
    /// Useful to exercise eviction, or to reserve units for external use.
    pub max_texture_units: Option<u32>,
}
