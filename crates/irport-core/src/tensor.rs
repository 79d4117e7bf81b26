use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu { device_id: u32 },
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("CPU"),
            Device::Gpu { device_id } => write!(f, "GPU.{device_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::U8 => 1,
        }
    }

    /// Port `precision` token of the IR format.
    pub fn ir_precision(self) -> &'static str {
        match self {
            DType::F32 => "FP32",
            DType::F16 => "FP16",
            DType::I64 => "I64",
            DType::I32 => "I32",
            DType::U8 => "U8",
        }
    }

    /// `element_type` token of the IR format.
    pub fn ir_element_type(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        }
    }

    pub fn from_ir_precision(raw: &str) -> Option<Self> {
        [DType::F32, DType::F16, DType::I64, DType::I32, DType::U8]
            .into_iter()
            .find(|d| d.ir_precision() == raw)
    }

    pub fn from_ir_element_type(raw: &str) -> Option<Self> {
        [DType::F32, DType::F16, DType::I64, DType::I32, DType::U8]
            .into_iter()
            .find(|d| d.ir_element_type() == raw)
    }

    /// Accepts both the element-type token (`f32`) and the precision token (`FP32`).
    pub fn parse(raw: &str) -> Result<Self> {
        let found = [DType::F32, DType::F16, DType::I64, DType::I32, DType::U8]
            .into_iter()
            .find(|d| {
                d.ir_element_type().eq_ignore_ascii_case(raw)
                    || d.ir_precision().eq_ignore_ascii_case(raw)
            });
        match found {
            Some(dtype) => Ok(dtype),
            None => bail!("unsupported element type: {raw}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    /// Element count; fails instead of wrapping when the product overflows.
    pub fn numel(&self) -> Result<usize> {
        match self.0.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d)) {
            Some(n) => Ok(n.max(1)),
            None => bail!("element count of shape {:?} overflows usize", self.0.as_slice()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
    pub device: Device,
}

/// Host-resident tensor. Device buffers stay inside the backend that owns them.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub bytes: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc {
                dtype,
                shape,
                device: Device::Cpu,
            },
            bytes,
        }
    }

    pub fn from_f32(shape: Shape, data: &[f32]) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_cpu_bytes(DType::F32, shape, Bytes::from(bytes))
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        ensure!(
            self.desc.dtype == DType::F32,
            "expected an f32 tensor, got {:?}",
            self.desc.dtype
        );
        let expected = self
            .desc
            .shape
            .numel()?
            .checked_mul(DType::F32.byte_size())
            .context("f32 tensor byte size overflows usize")?;
        ensure!(
            self.bytes.len() == expected,
            "f32 tensor byte size mismatch: got {}, expected {}",
            self.bytes.len(),
            expected
        );
        Ok(self
            .bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_tokens() {
        assert_eq!(DType::F32.ir_precision(), "FP32");
        assert_eq!(DType::F32.ir_element_type(), "f32");
        assert_eq!(DType::from_ir_precision("FP16"), Some(DType::F16));
        assert_eq!(DType::from_ir_precision("fp32"), None);
        assert_eq!(DType::from_ir_element_type("i64"), Some(DType::I64));
        assert_eq!(DType::parse("fp32").unwrap(), DType::F32);
        assert_eq!(DType::parse("f16").unwrap(), DType::F16);
        assert!(DType::parse("bf16").is_err());
    }

    #[test]
    fn f32_tensor_bytes() {
        let data = [0.5f32, -1.25, 3.0, 8.0];
        let tensor = Tensor::from_f32(Shape::from_slice(&[2, 2]), &data);
        assert_eq!(tensor.byte_len(), 16);
        assert_eq!(tensor.to_f32_vec().unwrap(), data);
    }

    #[test]
    fn f32_tensor_rejects_short_buffer() {
        let tensor = Tensor::from_cpu_bytes(
            DType::F32,
            Shape::from_slice(&[3]),
            Bytes::from_static(&[0u8; 8]),
        );
        assert!(tensor.to_f32_vec().is_err());
    }

    #[test]
    fn numel_overflow_is_an_error() {
        assert_eq!(Shape::from_slice(&[2, 3, 4]).numel().unwrap(), 24);
        assert_eq!(Shape::from_slice(&[]).numel().unwrap(), 1);
        let huge = Shape::from_slice(&[1, 3, 1 << 40, 1 << 40]);
        assert!(huge.numel().is_err());
    }

    #[test]
    fn device_display() {
        assert_eq!(Device::Cpu.to_string(), "CPU");
        assert_eq!(Device::Gpu { device_id: 1 }.to_string(), "GPU.1");
    }
}
