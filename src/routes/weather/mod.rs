mod handler;

pub use handler::scan_weather;
