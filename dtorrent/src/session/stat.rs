//! Aggregate byte counters for the whole session, rolled once per second.

/// Running totals plus the rates derived from the last `second_tick`.
#[derive(Debug, Clone, Default)]
pub struct Stat {
    total_download: u64,
    total_upload: u64,
    download_rate: f64,
    upload_rate: f64,
    download_this_tick: u64,
    upload_this_tick: u64,
}

impl Stat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_download(&mut self, bytes: u64) {
        self.total_download += bytes;
        self.download_this_tick += bytes;
    }

    pub fn add_upload(&mut self, bytes: u64) {
        self.total_upload += bytes;
        self.upload_this_tick += bytes;
    }

    /// Rolls the per-tick counters into a rate and resets them. Called once
    /// per second from the reactor's tick phase, never more often.
    pub fn second_tick(&mut self) {
        self.download_rate = self.download_this_tick as f64;
        self.upload_rate = self.upload_this_tick as f64;
        self.download_this_tick = 0;
        self.upload_this_tick = 0;
    }

    pub fn download_rate(&self) -> f64 {
        self.download_rate
    }

    pub fn upload_rate(&self) -> f64 {
        self.upload_rate
    }

    pub fn total_download(&self) -> u64 {
        self.total_download
    }

    pub fn total_upload(&self) -> u64 {
        self.total_upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_turns_accumulated_bytes_into_a_rate_and_resets() {
        let mut stat = Stat::new();
        stat.add_download(1000);
        stat.add_upload(500);
        stat.second_tick();

        assert_eq!(stat.download_rate(), 1000.0);
        assert_eq!(stat.upload_rate(), 500.0);
        assert_eq!(stat.total_download(), 1000);

        stat.second_tick();
        assert_eq!(stat.download_rate(), 0.0);
    }
}
