pub mod groq;
pub mod models;
pub mod query;
pub mod rest;

#[cfg(test)]
pub(crate) mod stub;
