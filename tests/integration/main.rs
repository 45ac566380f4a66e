mod fixtures;
mod inspect;
mod pipeline;
