use serde::Serialize;
use std::collections::BTreeMap;

/// Per-job file counters aggregated over all tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Counter {
    FilesSucceeded,
    FilesFailed,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Counter::FilesSucceeded => "FILES_SUCCEEDED",
            Counter::FilesFailed => "FILES_FAILED",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    values: BTreeMap<Counter, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, counter: Counter, by: u64) {
        *self.values.entry(counter).or_insert(0) += by;
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values.get(&counter).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &Counters) {
        for (counter, value) in &other.values {
            self.increment(*counter, *value);
        }
    }
}
