use canopy_model::ResourceInfo;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stands in for the evaluator: consumes the resource stream until every
/// producer is gone and returns how many envelopes arrived.
pub async fn drain(mut rx: mpsc::Receiver<ResourceInfo>) -> usize {
    let mut total = 0;
    let mut current: Option<(i64, usize)> = None;

    while let Some(info) = rx.recv().await {
        total += 1;
        let sequence = info.cycle_metadata.sequence;

        match info.to_fields() {
            Ok(fields) => match serde_json::to_string(&fields) {
                Ok(json) => debug!(target: "canopy::evaluator", cycle = sequence, resource = %json, "received resource"),
                Err(err) => warn!(target: "canopy::evaluator", cycle = sequence, error = %err, "failed to encode resource"),
            },
            Err(err) => {
                warn!(target: "canopy::evaluator", cycle = sequence, error = %err, "resource has no usable metadata");
            }
        }

        current = match current {
            Some((seq, count)) if seq == sequence => Some((seq, count + 1)),
            Some((seq, count)) => {
                report(seq, count);
                Some((sequence, 1))
            }
            None => Some((sequence, 1)),
        };
    }

    if let Some((seq, count)) = current {
        report(seq, count);
    }
    info!(target: "canopy::evaluator", total, "resource stream closed");
    total
}

fn report(cycle: i64, resources: usize) {
    info!(target: "canopy::evaluator", cycle, resources, "cycle resources received");
}
