//! Active track head: the latest observation of a track still open for
//! extension.

use crate::types::{Observation, TrackId};

#[derive(Clone, Debug)]
pub struct TrackHead<'a> {
    /// Track this head belongs to
    pub id: TrackId,
    /// Frame of the latest observation
    pub last_frame: u64,
    /// Latest observation, borrowed from the input frames
    pub obs: &'a Observation,
    /// Number of points linked so far
    pub len: usize,
}

impl<'a> TrackHead<'a> {
    pub fn new(id: TrackId, obs: &'a Observation) -> Self {
        Self {
            id,
            last_frame: obs.frame,
            obs,
            len: 1,
        }
    }

    /// Frames elapsed between this head and `frame`.
    #[inline]
    pub fn gap_to(&self, frame: u64) -> u64 {
        frame.saturating_sub(self.last_frame)
    }

    /// Move the head to a newer observation of the same track.
    pub fn advance(&mut self, obs: &'a Observation) {
        self.last_frame = obs.frame;
        self.obs = obs;
        self.len += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_updates_gap() {
        let a = Observation::new(2, vec![0.0, 0.0]);
        let b = Observation::new(5, vec![1.0, 0.0]);
        let mut head = TrackHead::new(TrackId(1), &a);
        assert_eq!(head.gap_to(4), 2);
        head.advance(&b);
        assert_eq!(head.gap_to(6), 1);
        assert_eq!(head.len, 2);
    }
}
