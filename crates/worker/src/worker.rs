//! The atlas worker: an OS thread fed through typed channels.
//!
//! Inputs are deep-copied into the [`WorkerRequest::Start`] message and the
//! transformed meshes come back in [`WorkerMessage::Done`]; nothing is
//! shared with the thread while it runs. [`build_atlas`] wraps the whole
//! exchange and copies the results back onto the caller's meshes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;

use lightbake_core::folding::StageFolder;
use lightbake_core::progress::ProgressSink;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::atlas::{self, AtlasParams};
use crate::error::{AtlasError, WorkerError};
use crate::geometry::MeshBuffers;
use crate::messages::{WorkerMessage, WorkerRequest};

const THREAD_NAME: &str = "lightbake-atlas";

/// Handle to one running atlas worker.
///
/// One worker serves exactly one `Start` request. Dropping the handle, or
/// calling [`terminate`](Self::terminate), raises the abort flag; the
/// thread stops at its next progress report and sends nothing more.
pub struct AtlasWorker {
    requests: std_mpsc::Sender<WorkerRequest>,
    messages: mpsc::UnboundedReceiver<WorkerMessage>,
    abort: Arc<AtomicBool>,
}

impl AtlasWorker {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = std_mpsc::channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let abort = Arc::new(AtomicBool::new(false));
        let abort_flag = abort.clone();

        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || serve(request_rx, message_tx, abort_flag))
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            requests: request_tx,
            messages: message_rx,
            abort,
        })
    }

    pub fn post(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.requests
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Next message from the worker, `None` once it has gone away.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.messages.recv().await
    }

    /// Tear the worker down without waiting for it.
    pub fn terminate(self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

impl Drop for AtlasWorker {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

/// Worker thread body.
fn serve(
    requests: std_mpsc::Receiver<WorkerRequest>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
    abort: Arc<AtomicBool>,
) {
    let Ok(WorkerRequest::Start { mut inputs, params }) = requests.recv() else {
        return;
    };
    tracing::debug!(meshes = inputs.len(), resolution = params.resolution, "Atlas worker started");

    let result = atlas::generate(&mut inputs, &params, &mut |stage, progress| {
        if abort.load(Ordering::Relaxed) {
            return false;
        }
        messages
            .send(WorkerMessage::Progress {
                stage: stage.label().to_string(),
                progress,
            })
            .is_ok()
    });

    let message = match result {
        Ok(summary) => {
            tracing::debug!(charts = summary.charts, scale = summary.texels_per_unit, "Atlas worker done");
            WorkerMessage::Done { result: inputs }
        }
        Err(AtlasError::Aborted) => {
            tracing::debug!("Atlas worker aborted");
            return;
        }
        Err(e) => WorkerMessage::Error {
            error: e.to_string(),
        },
    };
    let _ = messages.send(message);
}

/// Run the atlas transform for `meshes` on a fresh worker.
///
/// Progress is folded into stages on `sink`. When `cancel` fires the worker
/// is torn down, the open stage is cancelled and [`WorkerError::Cancelled`]
/// is returned; `meshes` are left untouched. On success the transformed
/// buffers are copied back onto `meshes`.
pub async fn build_atlas(
    meshes: &mut [MeshBuffers],
    params: &AtlasParams,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<(), WorkerError> {
    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    let mut worker = AtlasWorker::spawn()?;
    worker.post(WorkerRequest::Start {
        inputs: meshes.to_vec(),
        params: *params,
    })?;

    let mut folder = StageFolder::new(sink);
    let result = receive(&mut worker, &mut folder, cancel).await;
    worker.terminate();

    match result {
        Ok(result) => {
            copy_back(meshes, result)?;
            tracing::info!(meshes = meshes.len(), "Atlas applied");
            Ok(())
        }
        Err(WorkerError::Cancelled) => {
            tracing::info!("Atlas cancelled");
            Err(WorkerError::Cancelled)
        }
        Err(e) => {
            tracing::error!(error = %e, "Atlas failed");
            Err(e)
        }
    }
}

/// Fold worker messages until a terminal one arrives.
async fn receive(
    worker: &mut AtlasWorker,
    folder: &mut StageFolder<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<MeshBuffers>, WorkerError> {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            message = worker.recv() => Some(message),
        };
        let Some(message) = message else {
            folder.fail();
            return Err(WorkerError::Cancelled);
        };

        match message {
            Some(WorkerMessage::Progress { stage, progress }) => {
                folder.advance(&stage, progress);
            }
            Some(WorkerMessage::Done { result }) => {
                folder.finish();
                return Ok(result);
            }
            Some(WorkerMessage::Error { error }) => {
                folder.fail();
                return Err(WorkerError::Failed(error));
            }
            None => {
                folder.fail();
                return Err(WorkerError::Disconnected);
            }
        }
    }
}

/// Copy worker results onto the caller's meshes.
///
/// Every result must keep the index length and the length of every
/// attribute the original already had. Nothing is written unless all
/// results pass that check.
pub fn copy_back(meshes: &mut [MeshBuffers], results: Vec<MeshBuffers>) -> Result<(), WorkerError> {
    if results.len() != meshes.len() {
        return Err(WorkerError::ShapeMismatch {
            mesh: meshes.len().min(results.len()),
            detail: format!("expected {} meshes, got {}", meshes.len(), results.len()),
        });
    }

    for (i, (original, result)) in meshes.iter().zip(&results).enumerate() {
        if result.index.len() != original.index.len() {
            return Err(WorkerError::ShapeMismatch {
                mesh: i,
                detail: format!(
                    "index has {} entries, expected {}",
                    result.index.len(),
                    original.index.len()
                ),
            });
        }
        for (name, attribute) in &original.attributes {
            let returned = result.attributes.get(name).map(|a| a.data.len());
            if returned != Some(attribute.data.len()) {
                return Err(WorkerError::ShapeMismatch {
                    mesh: i,
                    detail: format!(
                        "attribute {name} has {} components, expected {}",
                        returned.unwrap_or(0),
                        attribute.data.len()
                    ),
                });
            }
        }
    }

    for (original, result) in meshes.iter_mut().zip(results) {
        original.index.copy_from_slice(&result.index);
        original.attributes.extend(result.attributes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use lightbake_core::timeline::StageTimeline;

    use super::*;
    use crate::atlas::tests::{quad, quad_and_triangle};
    use crate::atlas::AtlasStage;
    use crate::geometry::{Attribute, BufferData, UV2};

    fn params() -> AtlasParams {
        AtlasParams {
            resolution: 64,
            margin: 2,
        }
    }

    fn stage_names(timeline: &StageTimeline) -> Vec<String> {
        timeline.records().into_iter().map(|r| r.name).collect()
    }

    #[tokio::test]
    async fn atlas_runs_on_worker_and_is_copied_back() {
        let original = vec![quad_and_triangle(), quad()];
        let mut meshes = original.clone();
        let timeline = StageTimeline::new();

        build_atlas(&mut meshes, &params(), &timeline, &CancellationToken::new())
            .await
            .unwrap();

        for (before, after) in original.iter().zip(&meshes) {
            assert_eq!(after.index.len(), before.index.len());
            assert_eq!(after.vertex_count(), before.vertex_count());
            assert!(after.attribute(UV2).is_some());
        }
        let expected: Vec<String> = AtlasStage::ALL.iter().map(|s| s.label().to_string()).collect();
        assert_eq!(stage_names(&timeline), expected);
        assert!(timeline.records().iter().all(|r| r.is_closed() && !r.cancelled));
    }

    #[tokio::test]
    async fn invalid_input_fails_with_worker_message() {
        let mut meshes = vec![MeshBuffers::default()];
        let timeline = StageTimeline::new();

        let result = build_atlas(&mut meshes, &params(), &timeline, &CancellationToken::new()).await;

        assert_matches!(result, Err(WorkerError::Failed(message)) if message.contains("missing position"));
        assert_eq!(meshes, vec![MeshBuffers::default()]);
        let last = timeline.records().pop().unwrap();
        assert!(last.cancelled);
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_worker() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let original = vec![quad()];
        let mut meshes = original.clone();
        let timeline = StageTimeline::new();

        let result = build_atlas(&mut meshes, &params(), &timeline, &cancel).await;

        assert_matches!(result, Err(WorkerError::Cancelled));
        assert_eq!(meshes, original);
        assert!(timeline.records().is_empty());
    }

    #[tokio::test]
    async fn raw_protocol_ends_with_one_terminal_message() {
        let mut worker = AtlasWorker::spawn().unwrap();
        worker
            .post(WorkerRequest::Start {
                inputs: vec![quad()],
                params: params(),
            })
            .unwrap();

        let mut messages = Vec::new();
        while let Some(message) = worker.recv().await {
            messages.push(message);
        }

        let (last, progress) = messages.split_last().unwrap();
        assert_matches!(last, WorkerMessage::Done { result } if result.len() == 1);
        assert!(progress.iter().all(|m| !m.is_terminal()));
        assert_matches!(
            &progress[0],
            WorkerMessage::Progress { stage, .. } if stage == AtlasStage::AddingMeshes.label()
        );
    }

    /// Worker double that replays a scripted message sequence.
    fn scripted(messages: Vec<WorkerMessage>) -> AtlasWorker {
        let (requests, _) = std_mpsc::channel();
        let (tx, rx) = mpsc::unbounded_channel();
        for message in messages {
            tx.send(message).unwrap();
        }
        AtlasWorker {
            requests,
            messages: rx,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn scripted_packing_progress_then_done_preserves_shape() {
        let mut meshes = vec![quad(), quad_and_triangle()];
        let mut transformed = meshes.clone();
        for mesh in &mut transformed {
            let count = mesh.vertex_count().unwrap();
            mesh.attributes.insert(
                UV2.to_string(),
                Attribute::new(2, BufferData::F32(vec![0.5; count * 2])),
            );
        }
        let mut worker = scripted(vec![
            WorkerMessage::Progress {
                stage: "packing".into(),
                progress: 0.5,
            },
            WorkerMessage::Done {
                result: transformed,
            },
        ]);
        let timeline = StageTimeline::new();
        let mut folder = StageFolder::new(&timeline);

        let result = receive(&mut worker, &mut folder, &CancellationToken::new())
            .await
            .unwrap();
        let lengths: Vec<(usize, usize)> = meshes
            .iter()
            .map(|m| (m.index.len(), m.attribute("position").unwrap().data.len()))
            .collect();
        copy_back(&mut meshes, result).unwrap();

        for (mesh, (index_len, position_len)) in meshes.iter().zip(lengths) {
            assert_eq!(mesh.index.len(), index_len);
            assert_eq!(mesh.attribute("position").unwrap().data.len(), position_len);
        }
        let records = timeline.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "packing");
        assert!(records[0].is_closed());
    }

    #[tokio::test]
    async fn worker_vanishing_is_disconnected() {
        let mut worker = scripted(vec![WorkerMessage::Progress {
            stage: "packing".into(),
            progress: 0.2,
        }]);
        let timeline = StageTimeline::new();
        let mut folder = StageFolder::new(&timeline);

        let result = receive(&mut worker, &mut folder, &CancellationToken::new()).await;
        assert_matches!(result, Err(WorkerError::Disconnected));
        assert!(timeline.records()[0].cancelled);
    }

    #[tokio::test]
    async fn cancel_while_waiting_cancels_open_stage() {
        let (requests, _) = std_mpsc::channel();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerMessage::Progress {
            stage: "packing".into(),
            progress: 0.1,
        })
        .unwrap();
        let mut worker = AtlasWorker {
            requests,
            messages: rx,
            abort: Arc::new(AtomicBool::new(false)),
        };
        let timeline = StageTimeline::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut folder = StageFolder::new(&timeline);
        let result = receive(&mut worker, &mut folder, &cancel).await;

        assert_matches!(result, Err(WorkerError::Cancelled));
        let records = timeline.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].cancelled);
        drop(tx);
    }

    #[test]
    fn copy_back_rejects_longer_index() {
        let mut meshes = vec![quad()];
        let mut longer = quad();
        longer.index.extend([0, 1, 2]);

        assert_matches!(
            copy_back(&mut meshes, vec![longer]),
            Err(WorkerError::ShapeMismatch { mesh: 0, .. })
        );
        assert_eq!(meshes, vec![quad()]);
    }

    #[test]
    fn copy_back_rejects_resized_attribute_and_count_mismatch() {
        let mut meshes = vec![quad(), quad()];
        let mut shrunk = quad();
        shrunk
            .attributes
            .insert("position".into(), Attribute::new(3, BufferData::F32(vec![0.0; 3])));

        assert_matches!(
            copy_back(&mut meshes, vec![quad(), shrunk]),
            Err(WorkerError::ShapeMismatch { mesh: 1, .. })
        );
        assert_matches!(
            copy_back(&mut meshes, vec![quad()]),
            Err(WorkerError::ShapeMismatch { .. })
        );
        assert_eq!(meshes, vec![quad(), quad()]);
    }
}
