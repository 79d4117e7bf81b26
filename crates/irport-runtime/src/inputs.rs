use anyhow::{ensure, Context, Result};
use irport_core::{DType, ModelSpec, Shape, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One f32 tensor per model input, uniform in `[0, 1)`. Input `k` draws from
/// its own generator seeded with `seed + k`, so inputs differ but runs repeat.
pub fn random_inputs(spec: &ModelSpec, seed: u64) -> Result<Vec<Tensor>> {
    spec.inputs
        .iter()
        .enumerate()
        .map(|(k, input)| -> Result<Tensor> {
            ensure!(
                input.dtype == DType::F32,
                "input {} is {:?}, only f32 inputs can be generated",
                input.name.0,
                input.dtype
            );
            let dims = input
                .static_dims()
                .with_context(|| format!("input {} has dynamic dims", input.name.0))?;
            let shape = Shape::from_slice(&dims);
            let numel = shape
                .numel()
                .with_context(|| format!("input {} is too large to generate", input.name.0))?;

            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
            let data: Vec<f32> = (0..numel).map(|_| rng.gen::<f32>()).collect();
            Ok(Tensor::from_f32(shape, &data))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use irport_core::{IOName, TensorSpec};

    use super::*;

    fn spec(dims: Vec<Option<usize>>, count: usize) -> ModelSpec {
        ModelSpec {
            name: "net".to_string(),
            inputs: (0..count)
                .map(|k| TensorSpec {
                    name: IOName(format!("in{k}")),
                    dtype: DType::F32,
                    rank: dims.len(),
                    dims: dims.clone(),
                })
                .collect(),
            outputs: Vec::new(),
        }
    }

    #[test]
    fn deterministic_per_seed_and_distinct_per_input() {
        let spec = spec(vec![Some(1), Some(3), Some(4), Some(4)], 3);
        let a = random_inputs(&spec, 42).unwrap();
        let b = random_inputs(&spec, 42).unwrap();
        assert_eq!(a.len(), 3);

        let a0 = a[0].to_f32_vec().unwrap();
        assert_eq!(a0, b[0].to_f32_vec().unwrap());
        assert_ne!(a0, a[1].to_f32_vec().unwrap());
        assert_eq!(a0.len(), 48);
        assert!(a0.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn rejects_overflowing_dims() {
        let spec = spec(vec![Some(1), Some(3), Some(1 << 40), Some(1 << 40)], 1);
        let err = random_inputs(&spec, 42).unwrap_err();
        assert!(format!("{err:#}").contains("overflows"), "{err:#}");
    }

    #[test]
    fn rejects_dynamic_dims() {
        let spec = spec(vec![Some(1), None], 1);
        assert!(random_inputs(&spec, 0).is_err());
    }
}
