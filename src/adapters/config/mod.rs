pub mod yaml_loader;
