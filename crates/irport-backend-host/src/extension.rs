use anyhow::{bail, ensure, Result};
use irport_ir::CustomOp;

/// Host implementation of a custom IR operation.
///
/// Extensions are looked up by the layer's `(type, version)` pair when a
/// model is loaded; a graph naming an unregistered op fails to load.
pub trait OpExtension: Send + Sync + 'static {
    fn op(&self) -> CustomOp;
    fn arity(&self) -> usize;

    /// Element-wise evaluation; every operand and `out` share one shape.
    fn evaluate(&self, inputs: &[&[f32]], out: &mut [f32]) -> Result<()>;
}

/// `out = (in0 + in1) * in2`
pub struct AddMul;

impl OpExtension for AddMul {
    fn op(&self) -> CustomOp {
        CustomOp::add_mul()
    }

    fn arity(&self) -> usize {
        3
    }

    fn evaluate(&self, inputs: &[&[f32]], out: &mut [f32]) -> Result<()> {
        let [a, b, c] = inputs else {
            bail!("CustomAddMul expects 3 inputs, got {}", inputs.len());
        };
        ensure!(
            a.len() == out.len() && b.len() == out.len() && c.len() == out.len(),
            "CustomAddMul operand lengths differ: {}, {}, {} -> {}",
            a.len(),
            b.len(),
            c.len(),
            out.len()
        );
        for (((o, a), b), c) in out.iter_mut().zip(a.iter()).zip(b.iter()).zip(c.iter()) {
            *o = (a + b) * c;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_mul_values() {
        let a: &[f32] = &[1.0, 2.0, 3.0];
        let b: &[f32] = &[1.0, 0.5, -3.0];
        let c: &[f32] = &[2.0, 4.0, 7.0];
        let mut out = [0.0f32; 3];
        AddMul.evaluate(&[a, b, c], &mut out).unwrap();
        assert_eq!(out, [4.0, 10.0, 0.0]);
    }

    #[test]
    fn add_mul_rejects_wrong_arity() {
        let one: &[f32] = &[1.0];
        let two: &[f32] = &[1.0, 2.0];
        let mut out = [0.0f32; 1];
        assert!(AddMul.evaluate(&[one, one], &mut out).is_err());
        assert!(AddMul.evaluate(&[one, one, two], &mut out).is_err());
    }
}
