//! ONNX-Runtime-backed face detector and embedding extractor.
//!
//! Grounded on the two-stage pipeline in the facial-recognition AI plugin:
//! a detection model (YOLO-style output tensor) followed by an optional
//! embedding model (ArcFace-style, L2-normalized output), both run through
//! `ort` with a TensorRT -> CUDA -> CPU execution-provider fallback chain.
//! NMS and IoU are no longer duplicated here; they live in
//! `common::face_geometry` and are shared with the recognition worker's
//! post-filter stage.

use super::{DetectOutput, DetectedFace, FaceDetector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::face_geometry::{non_max_suppression, BoundingBox, ScoredBox};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, Array4};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tokio::sync::Mutex;

pub struct OrtFaceDetectorConfig {
    pub detection_model_path: String,
    pub embedding_model_path: Option<String>,
    pub execution_provider: String,
    pub device_id: i32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub detection_input_size: u32,
    pub embedding_input_size: u32,
    pub intra_threads: usize,
    pub inter_threads: usize,
}

impl Default for OrtFaceDetectorConfig {
    fn default() -> Self {
        Self {
            detection_model_path: "./models/face_detection.onnx".to_string(),
            embedding_model_path: None,
            execution_provider: "CPU".to_string(),
            device_id: 0,
            confidence_threshold: 0.6,
            iou_threshold: 0.4,
            max_detections: 50,
            detection_input_size: 640,
            embedding_input_size: 112,
            intra_threads: 4,
            inter_threads: 1,
        }
    }
}

pub struct OrtFaceDetector {
    config: OrtFaceDetectorConfig,
    detection_session: Mutex<Option<Session>>,
    embedding_session: Mutex<Option<Session>>,
}

impl OrtFaceDetector {
    pub fn new(config: OrtFaceDetectorConfig) -> Self {
        Self {
            config,
            detection_session: Mutex::new(None),
            embedding_session: Mutex::new(None),
        }
    }

    fn create_session(&self, model_path: &str) -> Result<Session> {
        let builder = Session::builder()
            .context("failed to create session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?
            .with_intra_threads(self.config.intra_threads)
            .context("failed to set intra threads")?
            .with_inter_threads(self.config.inter_threads)
            .context("failed to set inter threads")?;

        let builder = match self.config.execution_provider.as_str() {
            "TENSORRT" => builder
                .with_execution_providers([TensorRTExecutionProvider::default()
                    .with_device_id(self.config.device_id)
                    .build()])
                .context("failed to register TensorRT provider")?,
            "CUDA" => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(self.config.device_id)
                    .build()])
                .context("failed to register CUDA provider")?,
            _ => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("failed to register CPU provider")?,
        };

        builder
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model from {model_path}"))
    }

    fn preprocess_for_detection(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.config.detection_input_size;
        let resized = image.resize_exact(size, size, FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let mut tensor = Array::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }
        tensor
    }

    fn preprocess_for_embedding(&self, crop: &DynamicImage) -> Array4<f32> {
        let size = self.config.embedding_input_size;
        let resized = crop.resize_exact(size, size, FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let mut tensor = Array::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            // ArcFace-style normalization to [-1, 1].
            tensor[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 / 127.5) - 1.0;
            tensor[[0, 1, y as usize, x as usize]] = (pixel[1] as f32 / 127.5) - 1.0;
            tensor[[0, 2, y as usize, x as usize]] = (pixel[2] as f32 / 127.5) - 1.0;
        }
        tensor
    }

    /// Parse a YOLO-format `[1, 5, N]` output tensor into scored boxes scaled
    /// to the original image dimensions, then apply NMS and the detection
    /// count cap.
    fn postprocess_detection(
        &self,
        raw: &[f32],
        num_predictions: usize,
        orig_w: u32,
        orig_h: u32,
    ) -> Vec<ScoredBox> {
        let input_size = self.config.detection_input_size as f32;
        let scale_x = orig_w as f32 / input_size;
        let scale_y = orig_h as f32 / input_size;

        let mut boxes = Vec::new();
        for i in 0..num_predictions {
            let cx = raw[i];
            let cy = raw[num_predictions + i];
            let w = raw[2 * num_predictions + i];
            let h = raw[3 * num_predictions + i];
            let conf = raw[4 * num_predictions + i];

            if conf < self.config.confidence_threshold {
                continue;
            }

            let bbox = BoundingBox {
                x: (cx - w / 2.0) * scale_x,
                y: (cy - h / 2.0) * scale_y,
                width: w * scale_x,
                height: h * scale_y,
            };
            boxes.push(ScoredBox { bbox, confidence: conf });
        }

        let mut kept = non_max_suppression(boxes, self.config.iou_threshold);
        kept.truncate(self.config.max_detections);
        kept
    }

    fn l2_normalize(vec: &mut [f32]) {
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
    }
}

#[async_trait]
impl FaceDetector for OrtFaceDetector {
    async fn detect(&self, jpeg: &[u8]) -> Result<DetectOutput> {
        let start = std::time::Instant::now();
        let image = image::load_from_memory(jpeg).context("failed to decode jpeg frame")?;
        let (orig_w, orig_h) = image.dimensions();

        {
            let mut guard = self.detection_session.lock().await;
            if guard.is_none() {
                *guard = Some(self.create_session(&self.config.detection_model_path)?);
            }
        }

        let input = self.preprocess_for_detection(&image);
        let detection_boxes = {
            let mut guard = self.detection_session.lock().await;
            let session = guard.as_mut().context("detection session not initialized")?;
            let outputs = session
                .run(ort::inputs![input.into_dyn()].context("failed to build detection inputs")?)
                .context("detection inference failed")?;
            let (shape, data) = outputs[0]
                .try_extract_raw_tensor::<f32>()
                .context("failed to extract detection output tensor")?;
            let num_predictions = shape[2] as usize;
            self.postprocess_detection(data, num_predictions, orig_w, orig_h)
        };

        let mut faces = Vec::with_capacity(detection_boxes.len());
        for scored in detection_boxes {
            let embedding = if self.config.embedding_model_path.is_some() {
                self.extract_embedding(&image, &scored.bbox).await?
            } else {
                Vec::new()
            };
            faces.push(DetectedFace {
                bbox: scored.bbox,
                confidence: scored.confidence,
                embedding,
            });
        }

        Ok(DetectOutput {
            faces,
            processing_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn dispose(&self) -> Result<()> {
        self.detection_session.lock().await.take();
        self.embedding_session.lock().await.take();
        Ok(())
    }

    async fn reinitialize(&self) -> Result<()> {
        self.dispose().await?;
        let mut det = self.detection_session.lock().await;
        *det = Some(self.create_session(&self.config.detection_model_path)?);
        if let Some(path) = &self.config.embedding_model_path {
            let mut emb = self.embedding_session.lock().await;
            *emb = Some(self.create_session(path)?);
        }
        Ok(())
    }
}

impl OrtFaceDetector {
    async fn extract_embedding(&self, image: &DynamicImage, bbox: &BoundingBox) -> Result<Vec<f32>> {
        let crop = image.crop_imm(
            bbox.x.max(0.0) as u32,
            bbox.y.max(0.0) as u32,
            bbox.width.max(1.0) as u32,
            bbox.height.max(1.0) as u32,
        );
        let input = self.preprocess_for_embedding(&crop);

        let mut guard = self.embedding_session.lock().await;
        if guard.is_none() {
            if let Some(path) = &self.config.embedding_model_path {
                *guard = Some(self.create_session(path)?);
            } else {
                return Ok(Vec::new());
            }
        }
        let session = guard.as_mut().context("embedding session not initialized")?;
        let outputs = session
            .run(ort::inputs![input.into_dyn()].context("failed to build embedding inputs")?)
            .context("embedding inference failed")?;
        let (_, data) = outputs[0]
            .try_extract_raw_tensor::<f32>()
            .context("failed to extract embedding output tensor")?;
        let mut embedding = data.to_vec();
        Self::l2_normalize(&mut embedding);
        Ok(embedding)
    }
}
