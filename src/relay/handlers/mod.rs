pub mod capture;
pub use self::capture::capture;

pub mod health;
pub use self::health::health;
