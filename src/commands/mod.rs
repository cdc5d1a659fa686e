pub mod export;
pub mod generate;
pub mod inspect;
pub mod settings;
pub mod suite;
pub mod utils;
