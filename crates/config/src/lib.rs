pub mod settings;

pub use settings::{
    InferenceSettings, SegmenterSettings, SessionSettings, Settings, VadSettings,
};
