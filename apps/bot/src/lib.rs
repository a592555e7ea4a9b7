use std::sync::Arc;

use analysis::{AnalysisPipeline, PriceClient, cache::CacheBackend};

pub mod command;
pub mod config;

pub type Pipeline = AnalysisPipeline<PriceClient, CacheBackend>;

pub struct Data {
    pub pipeline: Arc<Pipeline>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
