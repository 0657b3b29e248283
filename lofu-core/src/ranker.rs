//! Ordering and truncation of raw detections.
//!
//! Detections are ordered by side priority (`Left`, then `Right`, then
//! everything else), then by descending box area, then optionally by
//! ascending `x1`. The sort is stable, so equal keys keep their input order
//! and the selection is reproducible for the same input.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::EncodedImage;
use crate::detection::{Detection, Side};

/// Crops kept by the capture flow (one per foot).
pub const CAPTURE_CAP: usize = 2;

/// Crops kept by the review flow.
pub const REVIEW_CAP: usize = 4;

/// How many detections to keep and which tie-breaks to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankPolicy {
    pub cap: usize,
    /// Break exact area ties by the leftmost box.
    pub x1_tie_break: bool,
    /// Label overlay boxes that carry no side as `Unknown` instead of
    /// falling back to the class name.
    #[serde(default)]
    pub label_unknown: bool,
}

impl RankPolicy {
    pub const fn capture() -> Self {
        Self {
            cap: CAPTURE_CAP,
            x1_tie_break: false,
            label_unknown: false,
        }
    }

    pub const fn review() -> Self {
        Self {
            cap: REVIEW_CAP,
            x1_tie_break: true,
            label_unknown: true,
        }
    }
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self::capture()
    }
}

/// Sort rank of a side label; lower sorts first.
pub fn side_priority(side: Option<Side>) -> u8 {
    match side {
        Some(Side::Left) => 0,
        Some(Side::Right) => 1,
        Some(Side::Unknown) | None => 2,
    }
}

fn compare(a: &Detection, b: &Detection, policy: RankPolicy) -> Ordering {
    side_priority(a.side)
        .cmp(&side_priority(b.side))
        .then_with(|| b.area().total_cmp(&a.area()))
        .then_with(|| {
            if policy.x1_tie_break {
                a.x1.total_cmp(&b.x1)
            } else {
                Ordering::Equal
            }
        })
}

/// Order and truncate detections into a ranked selection.
pub fn rank(detections: &[Detection], policy: RankPolicy) -> RankedSelection {
    rank_owned(detections.to_vec(), policy)
}

pub fn rank_owned(mut detections: Vec<Detection>, policy: RankPolicy) -> RankedSelection {
    detections.sort_by(|a, b| compare(a, b, policy));
    detections.truncate(policy.cap);
    RankedSelection { detections }
}

/// Ordered, size-capped subset of detections chosen for cropping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedSelection {
    detections: Vec<Detection>,
}

impl RankedSelection {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.detections
    }

    /// Extract the crops, in selection order. Entries without a usable crop
    /// are skipped; orders stay 1-based positions in the selection.
    pub fn crops(&self) -> Vec<Crop> {
        self.detections
            .iter()
            .enumerate()
            .filter_map(|(i, det)| match det.crop_image()? {
                Ok(image) => Some(Crop {
                    order: i + 1,
                    side: det.side_or_unknown(),
                    image,
                }),
                Err(e) => {
                    warn!(order = i + 1, error = %e, "Skipping undecodable crop");
                    None
                }
            })
            .collect()
    }
}

/// One cropped foot image ready for classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    /// 1-based position in the ranked selection.
    pub order: usize,
    pub side: Side,
    pub image: EncodedImage,
}

impl Crop {
    /// Stable display id such as `Left_1`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.side, self.order)
    }

    /// Object name used when the crop is uploaded as the `position`-th
    /// (0-based) file of its batch. Numbering follows the upload, not
    /// [`order`](Self::order), so a skipped crop leaves no gap.
    pub fn object_name_at(&self, position: usize) -> String {
        let n = position + 1;
        match self.side {
            Side::Left | Side::Right => format!("{n}_{}.{}", self.side, self.image.extension()),
            Side::Unknown => format!("image_{n}.{}", self.image.extension()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn det(side: Option<Side>, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection {
            side,
            ..Detection::boxed(x1, y1, x2, y2)
        }
    }

    fn areas(selection: &RankedSelection) -> Vec<f64> {
        selection.iter().map(Detection::area).collect()
    }

    #[test]
    fn test_side_beats_area() {
        let input = vec![
            det(Some(Side::Right), 0.0, 0.0, 10.0, 10.0),
            det(Some(Side::Left), 20.0, 0.0, 25.0, 5.0),
        ];
        let ranked = rank(&input, RankPolicy::capture());
        assert_eq!(ranked.as_slice()[0].side, Some(Side::Left));
        assert_eq!(areas(&ranked), vec![25.0, 100.0]);
    }

    #[test]
    fn test_unlabeled_by_descending_area() {
        let input = vec![
            det(None, 0.0, 0.0, 4.0, 4.0),
            det(None, 0.0, 0.0, 2.0, 2.0),
        ];
        let ranked = rank(&input, RankPolicy::capture());
        assert_eq!(areas(&ranked), vec![16.0, 4.0]);
    }

    #[test]
    fn test_unknown_and_absent_are_grouped() {
        let input = vec![
            det(None, 0.0, 0.0, 1.0, 1.0),
            det(Some(Side::Unknown), 0.0, 0.0, 3.0, 3.0),
            det(Some(Side::Right), 0.0, 0.0, 2.0, 2.0),
        ];
        let ranked = rank(&input, RankPolicy::review());
        let sides: Vec<_> = ranked.iter().map(|d| d.side).collect();
        assert_eq!(sides, vec![Some(Side::Right), Some(Side::Unknown), None]);
    }

    #[test]
    fn test_x1_tie_break_only_in_review_policy() {
        let input = vec![
            det(Some(Side::Left), 50.0, 0.0, 60.0, 10.0),
            det(Some(Side::Left), 10.0, 0.0, 20.0, 10.0),
        ];

        let review = rank(&input, RankPolicy::review());
        assert_eq!(review.as_slice()[0].x1, 10.0);

        // Without the tie-break the stable sort keeps input order.
        let capture = rank(&input, RankPolicy::capture());
        assert_eq!(capture.as_slice()[0].x1, 50.0);
    }

    #[test]
    fn test_truncation_and_empty_input() {
        let input: Vec<_> = (0..6)
            .map(|i| det(None, 0.0, 0.0, i as f64, 1.0))
            .collect();
        assert_eq!(rank(&input, RankPolicy::capture()).len(), 2);
        assert_eq!(rank(&input, RankPolicy::review()).len(), 4);
        assert!(rank(&[], RankPolicy::review()).is_empty());
    }

    #[test]
    fn test_crops_skip_entries_without_images() {
        let mut with_crop = det(Some(Side::Left), 0.0, 0.0, 5.0, 5.0);
        with_crop.cropped_image = Some("data:image/png;base64,AAEC".into());
        let without_crop = det(Some(Side::Right), 0.0, 0.0, 5.0, 5.0);
        let mut broken = det(None, 0.0, 0.0, 1.0, 1.0);
        broken.cropped_image = Some("data:image/png;base64,***".into());

        let ranked = rank(&[without_crop, broken, with_crop], RankPolicy::review());
        let crops = ranked.crops();
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].order, 1);
        assert_eq!(crops[0].id(), "Left_1");
        assert_eq!(crops[0].object_name_at(0), "1_Left.png");
    }

    #[test]
    fn test_unknown_crop_object_name() {
        let crop = Crop {
            order: 3,
            side: Side::Unknown,
            image: EncodedImage::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg"),
        };
        assert_eq!(crop.object_name_at(2), "image_3.jpg");
        assert_eq!(crop.object_name_at(0), "image_1.jpg");
    }

    fn arb_detection() -> impl Strategy<Value = Detection> {
        (
            prop_oneof![
                Just(None),
                Just(Some(Side::Left)),
                Just(Some(Side::Right)),
                Just(Some(Side::Unknown)),
            ],
            -50.0..500.0f64,
            -50.0..500.0f64,
            -50.0..500.0f64,
            -50.0..500.0f64,
        )
            .prop_map(|(side, x1, y1, x2, y2)| det(side, x1, y1, x2, y2))
    }

    fn arb_policy() -> impl Strategy<Value = RankPolicy> {
        prop_oneof![Just(RankPolicy::capture()), Just(RankPolicy::review())]
    }

    proptest! {
        #[test]
        fn prop_length_is_bounded(
            input in prop::collection::vec(arb_detection(), 0..12),
            policy in arb_policy()
        ) {
            let ranked = rank(&input, policy);
            prop_assert!(ranked.len() <= policy.cap);
            prop_assert!(ranked.len() <= input.len());
        }

        #[test]
        fn prop_left_before_right(
            input in prop::collection::vec(arb_detection(), 0..12),
            left in arb_detection(),
            right in arb_detection()
        ) {
            let mut input = input;
            input.push(Detection { side: Some(Side::Right), ..right });
            input.push(Detection { side: Some(Side::Left), ..left });
            let ranked = rank(&input, RankPolicy { cap: usize::MAX, ..RankPolicy::capture() });

            let first_left = ranked.iter().position(|d| d.side == Some(Side::Left)).unwrap();
            let first_right = ranked.iter().position(|d| d.side == Some(Side::Right)).unwrap();
            prop_assert!(first_left < first_right);
        }

        #[test]
        fn prop_unlabeled_last_and_by_area(
            input in prop::collection::vec(arb_detection(), 0..12)
        ) {
            let ranked = rank(&input, RankPolicy { cap: usize::MAX, ..RankPolicy::capture() });
            let priorities: Vec<u8> = ranked.iter().map(|d| side_priority(d.side)).collect();
            prop_assert!(priorities.windows(2).all(|w| w[0] <= w[1]));

            let tail: Vec<f64> = ranked
                .iter()
                .filter(|d| side_priority(d.side) == 2)
                .map(Detection::area)
                .collect();
            prop_assert!(tail.windows(2).all(|w| w[0] >= w[1]));
        }

        #[test]
        fn prop_ranking_is_idempotent(
            input in prop::collection::vec(arb_detection(), 0..12),
            policy in arb_policy()
        ) {
            let once = rank(&input, policy);
            let twice = rank(once.as_slice(), policy);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_area_never_negative(d in arb_detection()) {
            prop_assert!(d.area() >= 0.0);
            if !d.bbox().is_valid() {
                prop_assert_eq!(d.area(), 0.0);
            }
        }
    }
}
