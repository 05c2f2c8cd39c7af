mod bridge;
mod helpers;
mod pipeline;
mod service;
