pub mod nes;

pub use nes::Nes;
