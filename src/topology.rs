//! Segment graph of a river network
//!
//! A network is a tree of segments draining to a single outlet. Each segment
//! carries its own ordered node coordinates (downstream distance from the
//! segment's upstream end).

use serde::{Deserialize, Serialize};

use crate::error::ResponseError;

/// Index of a segment within its network
pub type SegmentId = usize;

/// One reach between confluences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub upstream: Vec<SegmentId>,
    pub downstream: Option<SegmentId>,
    /// Node coordinates, strictly increasing
    pub x: Vec<f64>,
}

impl Segment {
    pub fn node_count(&self) -> usize {
        self.x.len()
    }

    pub fn is_channel_head(&self) -> bool {
        self.upstream.is_empty()
    }

    /// Distance spanned by the node coordinates
    pub fn length(&self) -> f64 {
        match (self.x.first(), self.x.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Validated segment tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTopology {
    segments: Vec<Segment>,
    outlet: SegmentId,
}

impl NetworkTopology {
    /// Build from explicit upstream and downstream id lists per segment
    pub fn new(
        upstream: Vec<Vec<SegmentId>>,
        downstream: Vec<Vec<SegmentId>>,
        x: Vec<Vec<f64>>,
    ) -> Result<Self, ResponseError> {
        let n = x.len();
        if upstream.len() != n || downstream.len() != n {
            return Err(ResponseError::InvalidTopology(format!(
                "{n} coordinate arrays but {} upstream and {} downstream lists",
                upstream.len(),
                downstream.len()
            )));
        }

        let mut segments = Vec::with_capacity(n);
        for (id, ((up, down), x)) in upstream.into_iter().zip(downstream).zip(x).enumerate() {
            if down.len() > 1 {
                return Err(ResponseError::InvalidTopology(format!(
                    "segment {id} has {} downstream segments",
                    down.len()
                )));
            }
            segments.push(Segment {
                id,
                upstream: up,
                downstream: down.first().copied(),
                x,
            });
        }

        Self::from_segments(segments)
    }

    /// Build from one optional downstream link per segment
    ///
    /// Upstream lists are derived in ascending id order.
    pub fn from_downstream(
        downstream: &[Option<SegmentId>],
        x: Vec<Vec<f64>>,
    ) -> Result<Self, ResponseError> {
        if downstream.len() != x.len() {
            return Err(ResponseError::InvalidTopology(format!(
                "{} downstream links but {} coordinate arrays",
                downstream.len(),
                x.len()
            )));
        }

        let n = downstream.len();
        let mut upstream = vec![Vec::new(); n];
        for (id, link) in downstream.iter().enumerate() {
            if let Some(down) = *link {
                if down >= n {
                    return Err(ResponseError::InvalidTopology(format!(
                        "segment {id} drains to unknown segment {down}"
                    )));
                }
                upstream[down].push(id);
            }
        }

        let segments = x
            .into_iter()
            .zip(upstream)
            .enumerate()
            .map(|(id, (x, upstream))| Segment {
                id,
                upstream,
                downstream: downstream[id],
                x,
            })
            .collect();

        Self::from_segments(segments)
    }

    /// A single unbranched segment
    pub fn single(x: Vec<f64>) -> Result<Self, ResponseError> {
        Self::from_downstream(&[None], vec![x])
    }

    fn from_segments(segments: Vec<Segment>) -> Result<Self, ResponseError> {
        let n = segments.len();
        if n == 0 {
            return Err(ResponseError::InvalidTopology(
                "network has no segments".to_string(),
            ));
        }

        for segment in &segments {
            let id = segment.id;
            if segment.x.is_empty() {
                return Err(ResponseError::InvalidTopology(format!(
                    "segment {id} has no nodes"
                )));
            }
            if segment.x.windows(2).any(|pair| !(pair[1] > pair[0])) {
                return Err(ResponseError::InvalidTopology(format!(
                    "segment {id} node coordinates are not strictly increasing"
                )));
            }

            for &up in &segment.upstream {
                let linked = segments.get(up).and_then(|s| s.downstream);
                if linked != Some(id) {
                    return Err(ResponseError::InvalidTopology(format!(
                        "segment {up} is upstream of {id} but does not drain to it"
                    )));
                }
            }

            if let Some(down) = segment.downstream {
                let reciprocal = segments
                    .get(down)
                    .is_some_and(|s| s.upstream.contains(&id));
                if !reciprocal {
                    return Err(ResponseError::InvalidTopology(format!(
                        "segment {id} drains to {down} which does not list it upstream"
                    )));
                }
            }
        }

        let outlets: Vec<SegmentId> = segments
            .iter()
            .filter(|s| s.downstream.is_none())
            .map(|s| s.id)
            .collect();
        let outlet = match outlets.as_slice() {
            [outlet] => *outlet,
            _ => {
                return Err(ResponseError::InvalidTopology(format!(
                    "expected exactly one outlet, found {}",
                    outlets.len()
                )))
            }
        };

        // Every segment must reach the outlet within n steps.
        for segment in &segments {
            let mut current = segment.id;
            let mut steps = 0;
            while let Some(down) = segments[current].downstream {
                current = down;
                steps += 1;
                if steps > n {
                    return Err(ResponseError::InvalidTopology(format!(
                        "segment {} lies on a cycle",
                        segment.id
                    )));
                }
            }
        }

        Ok(Self { segments, outlet })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn upstream(&self, id: SegmentId) -> &[SegmentId] {
        &self.segments[id].upstream
    }

    pub fn downstream(&self, id: SegmentId) -> Option<SegmentId> {
        self.segments[id].downstream
    }

    /// Segments with no upstream neighbour, in id order
    pub fn channel_heads(&self) -> Vec<SegmentId> {
        self.segments
            .iter()
            .filter(|s| s.is_channel_head())
            .map(|s| s.id)
            .collect()
    }

    pub fn outlet(&self) -> SegmentId {
        self.outlet
    }

    pub fn node_count(&self, id: SegmentId) -> usize {
        self.segments[id].node_count()
    }

    pub fn total_nodes(&self) -> usize {
        self.segments.iter().map(Segment::node_count).sum()
    }

    pub fn x(&self, id: SegmentId) -> &[f64] {
        &self.segments[id].x
    }

    /// Longest summed segment length from any channel head to the outlet
    pub fn trunk_length(&self) -> f64 {
        self.channel_heads()
            .into_iter()
            .map(|head| {
                let mut length = self.segments[head].length();
                let mut current = head;
                while let Some(down) = self.segments[current].downstream {
                    length += self.segments[down].length();
                    current = down;
                }
                length
            })
            .fold(0.0, f64::max)
    }
}
