//! MJPEG preview stream
//!
//! Serves the latest tracker frame as `multipart/x-mixed-replace`, with the
//! detections behind the current control signal drawn on top. The stream
//! ends when the tracker stops or the client goes away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use camera_capture::VideoFrame;
use detection::{Detection, DetectionClass};
use head_tracker::Snapshot;
use image::Rgb;
use imageproc::{drawing::draw_filled_rect_mut, drawing::draw_hollow_rect_mut, rect::Rect};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{ApiError, AppState};

const BOUNDARY: &str = "frame";
/// Side of the gaze indicator square, in pixels
const GAZE_MARKER: u32 = 16;

fn class_color(detection: &Detection) -> Rgb<u8> {
    match detection.class() {
        Some(DetectionClass::Serious) => Rgb([220, 60, 60]),
        Some(DetectionClass::Smiling) => Rgb([60, 200, 80]),
        Some(DetectionClass::BookLeft) | Some(DetectionClass::BookRight) => Rgb([240, 180, 40]),
        Some(DetectionClass::BookCenter) => Rgb([60, 140, 240]),
        None => Rgb([200, 200, 200]),
    }
}

/// Draw the snapshot's detections (and gaze marker) on its frame, encode JPEG
pub fn render_frame(snapshot: &Snapshot, mirror: bool, quality: u8) -> Result<Option<Vec<u8>>, ApiError> {
    let Some(frame) = &snapshot.frame else {
        return Ok(None);
    };

    let frame = if mirror {
        frame.flip_horizontal()
    } else {
        VideoFrame::clone(frame)
    };
    let mut img = frame.to_rgb_image()?;
    let width = frame.width as f32;

    for detection in &snapshot.raw_detections {
        let Some(bbox) = detection.bbox else {
            continue;
        };
        let bbox = if mirror { bbox.mirrored(width) } else { bbox };
        // also rejects NaN extents from a misbehaving model
        if !(bbox.width >= 1.0 && bbox.height >= 1.0) {
            continue;
        }
        let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width as u32, bbox.height as u32);
        draw_hollow_rect_mut(&mut img, rect, class_color(detection));
    }

    if let Some(gaze) = snapshot.gaze {
        let color = if gaze.looking_at_screen() {
            Rgb([0, 255, 0])
        } else {
            Rgb([255, 0, 0])
        };
        draw_filled_rect_mut(&mut img, Rect::at(8, 8).of_size(GAZE_MARKER, GAZE_MARKER), color);
    }

    let annotated = VideoFrame::new(
        img.into_raw(),
        frame.width,
        frame.height,
        frame.timestamp_ns,
        frame.sequence,
    );
    Ok(Some(annotated.to_jpeg(quality)?))
}

/// Wrap a JPEG as one multipart part
fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// `GET /video_feed`
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Vec<u8>, Infallible>>(2);
    let reader = state.tracker.reader();
    let mirror = state.config.tracker.mirror_display;
    let quality = state.config.server.jpeg_quality;
    let period = Duration::from_secs_f64(1.0 / f64::from(state.config.server.stream_fps.max(1)));

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_sent = 0u64;

        loop {
            ticker.tick().await;
            if !state.tracker.is_running() {
                break;
            }

            let snapshot = reader.snapshot();
            if snapshot.sequence == last_sent {
                continue;
            }
            last_sent = snapshot.sequence;

            let rendered = tokio::task::spawn_blocking(move || render_frame(&snapshot, mirror, quality)).await;
            let jpeg = match rendered {
                Ok(Ok(Some(jpeg))) => jpeg,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    warn!("Could not render preview frame: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Preview render task failed: {}", e);
                    break;
                }
            };

            if tx.send(Ok(multipart_part(&jpeg))).await.is_err() {
                debug!("Preview client disconnected");
                break;
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}
