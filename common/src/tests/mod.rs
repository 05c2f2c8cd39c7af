mod error_location;
mod text;
