use mapspace_explorer::*;
use mapspace_workload::{LayerNode, MemOperand, OADimension, SpatialMapping, Workload, WorkloadFactory};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug)]
struct Evaluated {
    accelerator: Arc<Accelerator>,
    macs: u64,
    mapping: SpatialMapping,
}

impl Evaluation for Evaluated {
    fn accelerator(&self) -> &Arc<Accelerator> { &self.accelerator }
    fn set_accelerator(&mut self, accelerator: Arc<Accelerator>) { self.accelerator = accelerator; }
}

// one evaluation per candidate, reporting what it was given
struct Evaluate;

impl LayerPipeline for Evaluate {
    type Output = Evaluated;
    type Extra = String;

    fn launch<'a>(&'a self, accelerator: Arc<Accelerator>, layer: Arc<LayerNode>) -> Result<StageIter<'a, Evaluated, String>> {
        let name = accelerator.name().to_owned();
        let result = Evaluated { accelerator, macs: layer.total_mac_count(), mapping: layer.spatial_mapping().clone() };
        Ok(Box::new(std::iter::once(Ok((result, name)))))
    }
}

fn accelerator() -> Arc<Accelerator> {
    let level = |name: &str, size, ops: &[&str], served: &[&str]| MemoryLevel::new(
        MemoryInstance::new(name, size),
        ops.iter().map(|o| MemOperand::new(o)),
        served.iter().map(|d| OADimension::new(d)),
    );
    let hierarchy = MemoryHierarchy::new("mh", vec![
        level("w_rf", 8 * 64, &["I2"], &[]),
        level("i_rf", 8 * 32, &["I1"], &["D2"]),
        level("o_rf", 24 * 16, &["O"], &["D2"]),
        level("gb", 8 << 20, &["I1", "I2", "O"], &["D1", "D2"]),
    ]);
    Arc::new(Accelerator::new("edge", [Core::new(1, OperationalArray::new([("D1", 8), ("D2", 8)]), hierarchy)]))
}

fn conv(id: usize, source: usize, fy: u64, fx: u64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("conv{id}"),
        "operator_type": "Conv",
        "equation": "O[b][k][oy][ox]+=W[k][c][fy][fx]*I[b][c][iy][ix]",
        "dimension_relations": ["ix=1*ox+1*fx", "iy=1*oy+1*fy"],
        "loop_dims": ["B", "K", "C", "OY", "OX", "FY", "FX"],
        "loop_sizes": [1, 32, 64, 28, 28, fy, fx],
        "operand_precision": {"O": 16, "O_final": 8, "W": 8, "I": 8},
        "operand_source": {"W": id, "I": source},
    })
}

fn workload(layers: serde_json::Value, mappings: serde_json::Value) -> Workload {
    WorkloadFactory::from_json(&layers.to_string(), &mappings.to_string()).unwrap().create().unwrap()
}

#[test]
fn full_user_mapping_yields_one_candidate() {
    let _ = env_logger::try_init();
    let w = workload(
        json!([conv(0, 0, 1, 1)]),
        json!([{"name": "Conv", "core_allocation": 1, "spatial_mapping": {"D1": ["K, 8"], "D2": ["C, 8"]}}]),
    );
    let acc = accelerator();
    let pipeline = SpatialMappingPipeline::new(ExplorerConfig::default(), Evaluate);
    let out: Vec<_> = WorkloadStage::new(&w, Arc::clone(&acc), pipeline)
        .run()
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(out.len(), 1);
    let (eval, (layer, (mapping, name))) = &out[0];
    assert_eq!(layer.id(), 0);
    assert_eq!(mapping, layer.spatial_mapping());
    assert_eq!(&eval.mapping, mapping);
    assert_eq!(mapping.to_string(), "{D1: [K:8], D2: [C:8]}");
    assert_eq!(eval.macs, 32 * 64 * 28 * 28);
    assert_eq!(name, "edge");
    assert!(Arc::ptr_eq(eval.accelerator(), &acc));
}

#[test]
fn diagonal_adaptation_is_invisible_upstream() {
    let _ = env_logger::try_init();
    // the second layer only fixes D1, D2 is generated from its hint
    let w = workload(
        json!([conv(0, 0, 3, 3), conv(1, 0, 3, 3)]),
        json!([
            {"name": "default", "spatial_mapping": {"D1": ["K, 8"]}, "spatial_mapping_hint": {"D2": ["OX", "C"]}},
        ]),
    );
    let acc = accelerator();
    let config = ExplorerConfig::from_json(r#"{"enable_weight_diagonal_mapping": true, "maximize_hardware_utilization": false}"#).unwrap();
    let pipeline = SpatialMappingPipeline::new(config, Evaluate);
    let out: Vec<_> = WorkloadStage::new(&w, Arc::clone(&acc), pipeline)
        .run()
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    // two layers times {OX, C, idle} on D2
    assert_eq!(out.len(), 6);
    assert_eq!(out.iter().map(|(_, (l, _))| l.id()).collect::<Vec<_>>(), [0, 0, 0, 1, 1, 1]);
    for (eval, (layer, (mapping, name))) in &out {
        assert!(Arc::ptr_eq(eval.accelerator(), &acc));
        let unrolls_ox = mapping.get(&"D2".into()).is_some_and(|m| m.contains(&"OX".into()));
        // layer 0 reads both operands from itself, so it is not weight stationary
        let expected = if unrolls_ox && layer.id() == 1 { "edge-supporting-diagonal-map" } else { "edge" };
        assert_eq!(name, expected);
    }
}

#[test]
fn incomplete_mapping_is_completed_under_defaults() {
    let _ = env_logger::try_init();
    let w = workload(
        json!([conv(0, 0, 1, 1)]),
        json!([{"name": "Conv", "core_allocation": 1, "spatial_mapping": {"D1": ["K, 8"]}}]),
    );
    let acc = accelerator();
    let pipeline = SpatialMappingPipeline::new(ExplorerConfig::default(), Evaluate);
    let out: Vec<_> = WorkloadStage::new(&w, Arc::clone(&acc), pipeline)
        .run()
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    // C, OY and OX all fill D2 completely
    let shown: Vec<_> = out.iter().map(|(_, (_, (m, _)))| m.to_string()).collect();
    assert_eq!(shown, ["{D1: [K:8], D2: [C:8]}", "{D1: [K:8], D2: [OY:8]}", "{D1: [K:8], D2: [OX:8]}"]);
    for (eval, (layer, (mapping, name))) in &out {
        assert_eq!(&eval.mapping, mapping);
        assert!(layer.spatial_mapping().get(&"D2".into()).is_none());
        assert_eq!(name, "edge");
    }
}
