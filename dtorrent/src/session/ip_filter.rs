//! IP filter rule evaluation is out of scope here; this is the permissive
//! default collaborator the session depends on — always reports the
//! address as not blocked.

use super::peer_record::PeerAddr;

#[derive(Debug, Clone, Default)]
pub struct IpFilter;

impl IpFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn is_blocked(&self, _addr: &PeerAddr) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_blocks_nothing() {
        let filter = IpFilter::new();
        assert!(!filter.is_blocked(&PeerAddr::V4([10, 0, 0, 1])));
        assert!(!filter.is_blocked(&PeerAddr::V6([0; 16])));
    }
}
