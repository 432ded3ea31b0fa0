mod settings;

pub use settings::{
    CaptureSettings, Command, Config, DnsSettings, InitTarget, MarkTrigger, NetmonSettings,
    Settings,
};
