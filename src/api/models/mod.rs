pub mod capture;

pub use capture::{CaptureScript, CapturedCrop, CapturedDetection, CapturedFrame};
