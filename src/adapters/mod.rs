pub mod config;
pub mod crawler;
pub mod http;
pub mod imaging;
pub mod onnx;
pub mod ultralytics;
