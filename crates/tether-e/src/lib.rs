pub mod backend;
pub mod webdriver;

pub use backend::WebDriverBackend;
pub use webdriver::{DEFAULT_WEBDRIVER_URL, DriverOptions};
