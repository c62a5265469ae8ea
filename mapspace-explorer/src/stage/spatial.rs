use log::{debug, error, info};
use mapspace_workload::{LayerNode, SpatialMapping};
use std::sync::Arc;

use super::{Evaluation, LayerPipeline, StageIter};
use crate::config::ExplorerConfig;
use crate::diagonal::{adapt_for_diagonal_mapping, Adaptation};
use crate::error::{ExploreError, Result};
use crate::generator::{SpatialMappingGenerator, UserSpatialMappingGenerator};
use crate::hardware::{Accelerator, Core};

/// Per-layer stage that walks the candidate spatial mappings and launches
/// the downstream pipeline once per candidate
pub struct SpatialMappingGeneratorStage<'p, P, G> {
    accelerator: Arc<Accelerator>,
    layer: Arc<LayerNode>,
    core: Arc<Core>,
    config: &'p ExplorerConfig,
    generator: &'p G,
    downstream: &'p P,
}

impl<'p, P, G> SpatialMappingGeneratorStage<'p, P, G>
where
    P: LayerPipeline,
    P::Output: Evaluation,
    G: SpatialMappingGenerator,
{
    pub fn new(
        accelerator: Arc<Accelerator>,
        layer: Arc<LayerNode>,
        config: &'p ExplorerConfig,
        generator: &'p G,
        downstream: &'p P,
    ) -> Result<Self> {
        let Some(core_id) = layer.core_allocation() else {
            error!("Layer {layer} has no core allocation.");
            return Err(ExploreError::NoCoreAllocation { layer: layer.id() });
        };
        let core = Arc::clone(accelerator.core(core_id)?);
        Ok(SpatialMappingGeneratorStage { accelerator, layer, core, config, generator, downstream })
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = SpatialMapping> + 'p> {
        let provided = self.layer.spatial_mapping();
        if provided.covers(self.core.operational_array.dimensions()) {
            return Box::new(std::iter::once(provided.clone()));
        }
        debug!("User-provided spatial mapping of {} incomplete. Auto-generating...", self.layer);
        self.generator.enumerate(&self.layer, &self.core, provided, self.config.enable_mix_spatial_mapping_generation)
    }

    pub fn run(self) -> SpatialMappingRun<'p, P> {
        SpatialMappingRun {
            candidates: self.candidates(),
            accelerator: self.accelerator,
            layer: self.layer,
            diagonal: self.config.enable_weight_diagonal_mapping,
            downstream: self.downstream,
            launched: 0,
            current: None,
            done: false,
        }
    }
}

// downstream results of the candidate being drained
struct Launched<'p, R, X> {
    mapping: SpatialMapping,
    adapted: bool,
    results: StageIter<'p, R, X>,
}

/// Lazy sequence of `(result, (mapping, extra))`, one candidate drained at a time
pub struct SpatialMappingRun<'p, P: LayerPipeline> {
    candidates: Box<dyn Iterator<Item = SpatialMapping> + 'p>,
    accelerator: Arc<Accelerator>,
    layer: Arc<LayerNode>,
    diagonal: bool,
    downstream: &'p P,
    launched: usize,
    current: Option<Launched<'p, P::Output, P::Extra>>,
    done: bool,
}

impl<'p, P> SpatialMappingRun<'p, P>
where
    P: LayerPipeline,
    P::Output: Evaluation,
{
    fn launch(&self, mapping: SpatialMapping) -> Result<Launched<'p, P::Output, P::Extra>> {
        let adaptation = match self.diagonal {
            true => adapt_for_diagonal_mapping(&self.accelerator, &self.layer, &mapping)?,
            false => Adaptation::Unchanged,
        };
        let (accelerator, adapted) = match adaptation {
            Adaptation::Adapted(acc) => (acc, true),
            Adaptation::Unchanged => (Arc::clone(&self.accelerator), false),
        };
        let layer = Arc::new(self.layer.with_spatial_mapping(mapping.clone()));
        let results = self.downstream.launch(accelerator, layer)?;
        Ok(Launched { mapping, adapted, results })
    }
}

impl<'p, P> Iterator for SpatialMappingRun<'p, P>
where
    P: LayerPipeline,
    P::Output: Evaluation,
{
    type Item = Result<(P::Output, (SpatialMapping, P::Extra))>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(current) = self.current.as_mut() {
                match current.results.next() {
                    Some(Ok((mut result, extra))) => {
                        // adaptation stays invisible above this stage
                        if current.adapted { result.set_accelerator(Arc::clone(&self.accelerator)); }
                        return Some(Ok((result, (current.mapping.clone(), extra))));
                    }
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }
            let Some(mapping) = self.candidates.next() else {
                self.done = true;
                break;
            };
            self.launched += 1;
            info!("Launching spatial mapping {}: {mapping}.", self.launched);
            match self.launch(mapping) {
                Ok(launched) => self.current = Some(launched),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// [`SpatialMappingGeneratorStage`] as a reusable pipeline link
pub struct SpatialMappingPipeline<P, G = UserSpatialMappingGenerator> {
    config: ExplorerConfig,
    generator: G,
    downstream: P,
}

impl<P> SpatialMappingPipeline<P> {
    pub fn new(config: ExplorerConfig, downstream: P) -> Self {
        let generator = UserSpatialMappingGenerator::new(config.maximize_hardware_utilization);
        SpatialMappingPipeline { config, generator, downstream }
    }
}

impl<P, G> SpatialMappingPipeline<P, G> {
    /// Replace the default generator. `maximize_hardware_utilization` only configures the
    /// default one, so `generator` is used as given.
    pub fn with_generator<H>(self, generator: H) -> SpatialMappingPipeline<P, H> {
        SpatialMappingPipeline { config: self.config, generator, downstream: self.downstream }
    }

    pub fn config(&self) -> &ExplorerConfig { &self.config }
}

impl<P, G> LayerPipeline for SpatialMappingPipeline<P, G>
where
    P: LayerPipeline,
    P::Output: Evaluation,
    G: SpatialMappingGenerator,
{
    type Output = P::Output;
    type Extra = (SpatialMapping, P::Extra);

    fn launch<'a>(&'a self, accelerator: Arc<Accelerator>, layer: Arc<LayerNode>) -> Result<StageIter<'a, Self::Output, Self::Extra>> {
        let stage = SpatialMappingGeneratorStage::new(accelerator, layer, &self.config, &self.generator, &self.downstream)?;
        Ok(Box::new(stage.run()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{accelerator, conv_attrs, conv_layer, Recorder};
    use mapspace_workload::{LayerAttrs, MappingSingleOADim, OADimension};

    fn full_mapping(d2: (&str, u32)) -> SpatialMapping {
        SpatialMapping::empty()
            .with("D1".into(), MappingSingleOADim::new().with("K".into(), 16))
            .with("D2".into(), MappingSingleOADim::new().with(d2.0.into(), d2.1))
    }

    #[test]
    fn full_user_mapping_is_the_only_candidate() {
        let _ = env_logger::try_init();
        let acc = Arc::new(accelerator(None));
        let sm = full_mapping(("C", 8));
        let recorder = Recorder { per_launch: 2, ..Default::default() };
        let config = ExplorerConfig::default();
        let generator = UserSpatialMappingGenerator::default();
        let layer = Arc::new(conv_layer(&["W"], sm.clone()));
        let out: Vec<_> = SpatialMappingGeneratorStage::new(acc, layer, &config, &generator, &recorder).unwrap()
            .run()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(_, (m, _))| *m == sm));
        assert_eq!(out[0].0.layer.spatial_mapping(), &sm);
        assert_eq!(out.iter().map(|(_, (_, x))| *x).collect::<Vec<_>>(), [0, 1]);
        assert_eq!(recorder.launches.borrow().len(), 1);
    }

    #[test]
    fn generated_candidates_arrive_in_order_on_layer_copies() {
        let acc = Arc::new(accelerator(None));
        let recorder = Recorder { per_launch: 1, ..Default::default() };
        let config = ExplorerConfig { maximize_hardware_utilization: false, ..Default::default() };
        let generator = UserSpatialMappingGenerator::new(false);
        let layer = Arc::new(conv_layer(&["W"], SpatialMapping::empty()));
        let expected: Vec<_> = generator.enumerate(&layer, acc.core(1).unwrap(), layer.spatial_mapping(), false).collect();
        let out: Vec<_> = SpatialMappingGeneratorStage::new(Arc::clone(&acc), Arc::clone(&layer), &config, &generator, &recorder).unwrap()
            .run()
            .map(|r| r.unwrap().1 .0)
            .collect();
        assert_eq!(out, expected);
        for ((_, launched), sm) in recorder.launches.borrow().iter().zip(&expected) {
            assert_eq!(launched.spatial_mapping(), sm);
        }
        assert!(layer.spatial_mapping().is_empty());
    }

    #[test]
    fn adapted_accelerator_is_hidden_from_callers() {
        let acc = Arc::new(accelerator(None));
        let recorder = Recorder { per_launch: 1, ..Default::default() };
        let config = ExplorerConfig { enable_weight_diagonal_mapping: true, ..Default::default() };
        let generator = UserSpatialMappingGenerator::default();
        let layer = Arc::new(conv_layer(&["W"], full_mapping(("OX", 4))));
        let out: Vec<_> = SpatialMappingGeneratorStage::new(Arc::clone(&acc), layer, &config, &generator, &recorder).unwrap()
            .run()
            .collect::<Result<_>>()
            .unwrap();
        let launched = &recorder.launches.borrow()[0].0;
        assert_eq!(launched.name(), "acc-supporting-diagonal-map");
        assert!(Arc::ptr_eq(out[0].0.accelerator(), &acc));
    }

    #[test]
    fn default_pipeline_generates_for_empty_mapping() {
        let acc = Arc::new(accelerator(None));
        let recorder = Recorder { per_launch: 1, ..Default::default() };
        let pipeline = SpatialMappingPipeline::new(ExplorerConfig::default(), &recorder);
        let layer = Arc::new(conv_layer(&["W"], SpatialMapping::empty()));
        let out: Vec<_> = pipeline.launch(acc, layer).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(recorder.launches.borrow().len(), 2);
        assert!(out.iter().all(|(_, (m, _))| m.covers([OADimension::new("D1"), OADimension::new("D2")].iter())));
    }

    #[test]
    fn missing_core_allocation_is_fatal() {
        let acc = Arc::new(accelerator(None));
        let recorder = Recorder::default();
        let config = ExplorerConfig::default();
        let generator = UserSpatialMappingGenerator::default();
        let layer = Arc::new(LayerNode::new(0, LayerAttrs { core_allocation: None, ..conv_attrs(&["W"]) }).unwrap());
        let err = SpatialMappingGeneratorStage::new(acc, layer, &config, &generator, &recorder).err();
        assert!(matches!(err, Some(ExploreError::NoCoreAllocation { layer: 0 })));
        assert!(recorder.launches.borrow().is_empty());
    }

    #[test]
    fn stops_after_first_error() {
        let acc = Arc::new(accelerator(None));
        let recorder = Recorder { per_launch: 3, fail_at: Some(1), ..Default::default() };
        let config = ExplorerConfig { maximize_hardware_utilization: false, ..Default::default() };
        let pipeline = SpatialMappingPipeline::new(config, &recorder)
            .with_generator(UserSpatialMappingGenerator::new(false));
        assert!(!pipeline.config().maximize_hardware_utilization);
        let layer = Arc::new(conv_layer(&["W"], SpatialMapping::empty()));
        let out: Vec<_> = pipeline.launch(acc, layer).unwrap().collect();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok() && out[1].is_err());
        assert_eq!(recorder.launches.borrow().len(), 1);
    }
}
