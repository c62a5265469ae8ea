use log::{debug, info};
use mapspace_workload::{LayerNode, Workload, WorkloadNode};
use std::sync::Arc;

use super::{LayerPipeline, StageIter};
use crate::error::Result;
use crate::hardware::Accelerator;
use crate::policy::{InMemoryComputeSkip, SkipPolicy};

/// Walks a workload in topological order and launches the pipeline once per layer
pub struct WorkloadStage<'w, P, S = InMemoryComputeSkip> {
    workload: &'w Workload,
    accelerator: Arc<Accelerator>,
    pipeline: P,
    policy: S,
}

impl<'w, P: LayerPipeline> WorkloadStage<'w, P> {
    pub fn new(workload: &'w Workload, accelerator: Arc<Accelerator>, pipeline: P) -> Self {
        WorkloadStage { workload, accelerator, pipeline, policy: InMemoryComputeSkip::default() }
    }
}

impl<'w, P: LayerPipeline, S: SkipPolicy> WorkloadStage<'w, P, S> {
    pub fn with_policy<T: SkipPolicy>(self, policy: T) -> WorkloadStage<'w, P, T> {
        WorkloadStage { workload: self.workload, accelerator: self.accelerator, pipeline: self.pipeline, policy }
    }

    /// Layers that will be visited, in visiting order
    pub fn schedule(&self) -> Result<Vec<(usize, Arc<LayerNode>)>> {
        let mut out = Vec::new();
        for (position, node) in self.workload.topological_order()?.into_iter().enumerate() {
            let layer = match node {
                WorkloadNode::Dummy(dummy) => {
                    debug!("Skipping {dummy}");
                    continue;
                }
                WorkloadNode::Layer(layer) => layer,
            };
            if let Some(core_id) = layer.core_allocation() {
                let core = self.accelerator.core(core_id)?;
                if self.policy.skip(layer, core, self.workload.source()) {
                    debug!("Skipping {layer}: executed by core {core_id} without a mapping");
                    continue;
                }
            }
            out.push((position, Arc::clone(layer)));
        }
        Ok(out)
    }

    /// Every error in the schedule surfaces here, before anything is launched
    pub fn run(&self) -> Result<WorkloadRun<'_, P>> {
        Ok(WorkloadRun {
            schedule: self.schedule()?.into_iter(),
            accelerator: Arc::clone(&self.accelerator),
            pipeline: &self.pipeline,
            current: None,
            done: false,
        })
    }
}

/// Lazy sequence of `(result, (layer, extra))`; one layer is drained before the next starts
pub struct WorkloadRun<'a, P: LayerPipeline> {
    schedule: std::vec::IntoIter<(usize, Arc<LayerNode>)>,
    accelerator: Arc<Accelerator>,
    pipeline: &'a P,
    current: Option<(Arc<LayerNode>, StageIter<'a, P::Output, P::Extra>)>,
    done: bool,
}

impl<'a, P: LayerPipeline> Iterator for WorkloadRun<'a, P> {
    type Item = Result<(P::Output, (Arc<LayerNode>, P::Extra))>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some((layer, results)) = self.current.as_mut() {
                match results.next() {
                    Some(Ok((result, extra))) => return Some(Ok((result, (Arc::clone(layer), extra)))),
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }
            let Some((position, layer)) = self.schedule.next() else {
                self.done = true;
                break;
            };
            match layer.name() {
                Some(name) => info!("Processing layer {name}..."),
                None => info!("Processing layer {position}..."),
            }
            match self.pipeline.launch(Arc::clone(&self.accelerator), Arc::clone(&layer)) {
                Ok(results) => self.current = Some((layer, results)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
