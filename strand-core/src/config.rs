/// Worker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of tasks handed out in response to a single steal
    /// request
    pub steal_batch: usize,
    /// Time to sleep between polls while idle, in microseconds. Zero only
    /// yields the thread
    pub idle_sleep_us: u64,
    /// Seed for the steal target selection, random if not set
    pub seed: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            steal_batch: 1,
            idle_sleep_us: 0,
            seed: None,
        }
    }
}
