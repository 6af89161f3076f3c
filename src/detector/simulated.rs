use super::Detector;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::types::{Alert, BoundingBox, DetectedObject, DetectionResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use uuid::Uuid;

/// Weighted draw table for the simulated detector, knife deliberately the
/// heaviest. Exposed as data so the distribution is inspectable and
/// adjustable without touching the sampling code.
pub const OBJECT_WEIGHTS: &[(&str, f64)] = &[
    ("knife", 0.30),
    ("cell phone", 0.20),
    ("scissors", 0.15),
    ("baseball bat", 0.15),
    ("tie", 0.10),
    ("handbag", 0.10),
];

const CONFIDENCE_RANGE: std::ops::Range<f64> = 0.75..0.99;

/// Weighted-random stand-in for the detection backend. Exists so the
/// pipeline is exercisable without a live endpoint; it is non-authoritative
/// and sits behind the same `Detector` trait as the real client.
pub struct SimulatedDetector {
    rng: Mutex<StdRng>,
    detection_probability: f64,
    camera_ids: Vec<String>,
}

impl SimulatedDetector {
    pub fn new(config: &DetectionConfig, camera_ids: Vec<String>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            detection_probability: config.detection_probability,
            camera_ids,
        }
    }

    fn draw_object_type(rng: &mut StdRng) -> &'static str {
        let total: f64 = OBJECT_WEIGHTS.iter().map(|(_, w)| w).sum();
        let mut roll = rng.gen_range(0.0..total);
        for (object_type, weight) in OBJECT_WEIGHTS {
            if roll < *weight {
                return object_type;
            }
            roll -= weight;
        }
        OBJECT_WEIGHTS[0].0
    }

    /// Plausible placement by object type: phones are small and central,
    /// knives elongated, everything else lands within the central 70%.
    fn mock_bounding_box(rng: &mut StdRng, object_type: &str) -> BoundingBox {
        match object_type {
            "cell phone" => BoundingBox {
                x: rng.gen_range(0.3..0.6),
                y: rng.gen_range(0.3..0.6),
                width: rng.gen_range(0.1..0.2),
                height: rng.gen_range(0.2..0.3),
            },
            "knife" => BoundingBox {
                x: rng.gen_range(0.0..0.6),
                y: rng.gen_range(0.1..0.8),
                width: rng.gen_range(0.25..0.4),
                height: rng.gen_range(0.05..0.12),
            },
            _ => BoundingBox {
                x: rng.gen_range(0.0..0.7),
                y: rng.gen_range(0.0..0.7),
                width: rng.gen_range(0.2..0.3),
                height: rng.gen_range(0.2..0.3),
            },
        }
    }
}

#[async_trait]
impl Detector for SimulatedDetector {
    async fn detect(&self, camera_id: &str, _image: &str) -> Result<DetectionResult> {
        let mut rng = self.rng.lock();

        if !rng.gen_bool(self.detection_probability) {
            return Ok(DetectionResult {
                detected: false,
                ..Default::default()
            });
        }

        let object_type = Self::draw_object_type(&mut rng);
        let confidence = rng.gen_range(CONFIDENCE_RANGE) as f32;
        let bounding_box = Self::mock_bounding_box(&mut rng, object_type);

        Ok(DetectionResult {
            detected: true,
            alert_id: Some(format!("alert-{}", Uuid::new_v4())),
            object_type: Some(object_type.to_string()),
            confidence: Some(confidence),
            timestamp: Some(Utc::now()),
            message: Some(format!(
                "Detected suspicious {} at camera {}",
                object_type, camera_id
            )),
            bounding_box: Some(bounding_box.clone()),
            all_detections: Some(vec![DetectedObject {
                object_type: object_type.to_string(),
                confidence,
                bounding_box,
            }]),
        })
    }

    async fn fetch_alert_history(&self) -> Result<Vec<Alert>> {
        let mut rng = self.rng.lock();
        let count = rng.gen_range(5..=15);
        let now = Utc::now();

        // distinct offsets keep the sort strictly descending
        let mut offsets: HashSet<i64> = HashSet::with_capacity(count);
        while offsets.len() < count {
            offsets.insert(rng.gen_range(0..60 * 60 * 24));
        }

        let mut alerts: Vec<Alert> = offsets
            .into_iter()
            .map(|seconds_ago| {
                let camera_id = if self.camera_ids.is_empty() {
                    format!("cam-{}", rng.gen_range(1..=4))
                } else {
                    self.camera_ids[rng.gen_range(0..self.camera_ids.len())].clone()
                };
                let object_type = Self::draw_object_type(&mut rng);
                Alert {
                    id: format!("sim-alert-{}", Uuid::new_v4()),
                    camera_id: camera_id.clone(),
                    object_type: object_type.to_string(),
                    timestamp: now - chrono::Duration::seconds(seconds_ago),
                    confidence: Some(rng.gen_range(CONFIDENCE_RANGE) as f32),
                    message: format!(
                        "Detected suspicious {} at camera {}",
                        object_type, camera_id
                    ),
                    bounding_box: None,
                }
            })
            .collect();

        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(alerts)
    }
}
