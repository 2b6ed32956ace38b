pub mod dto;
pub mod evaluation_service;
pub mod label_service;
pub mod ports;
pub mod preprocess_service;
pub mod scrape_service;
pub mod services;
pub mod training_service;
