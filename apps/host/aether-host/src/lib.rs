// Library exports for testing
// The binary (main.rs) imports these as well

pub mod error;
pub mod host_loop;
pub mod logger;
pub mod python_executor;

#[cfg(test)]
mod tests;
