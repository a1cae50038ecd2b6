/// Suppresses repeat persistence of the code currently in view.
///
/// Only the most recent admitted payload is remembered: a code that leaves and comes back
/// after a different code was seen is admitted again.
#[derive(Debug, Default, Clone)]
pub struct DedupGate {
    last_payload: Option<String>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `payload` differs from the last admitted one, and remembers it.
    /// Empty payloads are never admitted and leave the gate untouched.
    pub fn admit(&mut self, payload: &str) -> bool {
        if payload.is_empty() || self.last_payload.as_deref() == Some(payload) {
            return false;
        }
        self.last_payload = Some(payload.to_owned());
        true
    }

    pub fn last_payload(&self) -> Option<&str> {
        self.last_payload.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_only_changes() {
        let mut gate = DedupGate::new();
        let admitted: Vec<bool> = ["A", "A", "B", "B", "A"]
            .iter()
            .map(|p| gate.admit(p))
            .collect();
        assert_eq!(admitted, [true, false, true, false, true]);
        assert_eq!(gate.last_payload(), Some("A"));
    }

    #[test]
    fn empty_detection_does_not_reset() {
        let mut gate = DedupGate::new();
        assert!(gate.admit("A"));
        assert!(!gate.admit(""));
        assert!(!gate.admit("A"));
        assert_eq!(gate.last_payload(), Some("A"));
    }

    #[test]
    fn fresh_gate_is_empty() {
        let mut gate = DedupGate::new();
        assert_eq!(gate.last_payload(), None);
        assert!(!gate.admit(""));
        assert_eq!(gate.last_payload(), None);
    }
}
