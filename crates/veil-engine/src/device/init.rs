/// Initialization parameters for the device layer.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    /// Backends the instance may pick an adapter from.
    pub backends: wgpu::Backends,

    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter. Mostly useful for headless tests.
    pub force_fallback_adapter: bool,

    /// Features the device must have.
    ///
    /// Line polygon mode and clamp-to-border addressing are requested on top
    /// of these whenever the adapter offers them.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    ///
    /// `None` uses downlevel defaults raised to the adapter's resolution limits.
    pub required_limits: Option<wgpu::Limits>,

    /// Debug label of the logical device.
    pub label: &'static str,
}

impl DeviceInit {
    /// Features requested in addition to `required_features` when available.
    pub const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::POLYGON_MODE_LINE
        .union(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);

    /// Features to request from an adapter offering `available`.
    pub fn features_for(&self, available: wgpu::Features) -> wgpu::Features {
        self.required_features | (Self::OPTIONAL_FEATURES & available)
    }
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: None,
            label: "veil device",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_features_follow_adapter() {
        let init = DeviceInit::default();
        assert_eq!(init.features_for(wgpu::Features::empty()), wgpu::Features::empty());
        assert_eq!(
            init.features_for(wgpu::Features::POLYGON_MODE_LINE | wgpu::Features::TIMESTAMP_QUERY),
            wgpu::Features::POLYGON_MODE_LINE
        );
    }

    #[test]
    fn required_features_are_kept() {
        let init = DeviceInit {
            required_features: wgpu::Features::DEPTH_CLIP_CONTROL,
            ..Default::default()
        };
        assert!(init
            .features_for(wgpu::Features::empty())
            .contains(wgpu::Features::DEPTH_CLIP_CONTROL));
    }
}
