
pub use audio::{
    silence_mono16, silence_stereo48_bytes, voiced_mono16, voiced_stereo48_bytes, EnergyClassifier,
};
pub use mock_worker::MockWorker;
