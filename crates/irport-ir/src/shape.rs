use std::fmt;
use std::str::FromStr;

use irport_core::Shape;

use crate::{parse_err, IrError, IrResult};

/// NCHW shape carried by every port of the emitted graph.
///
/// Dimensions are signed so a caller-supplied zero or negative value can be
/// reported as [`IrError::InvalidShape`] instead of being unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TensorShape {
    pub n: i64,
    pub c: i64,
    pub h: i64,
    pub w: i64,
}

impl TensorShape {
    pub const fn new(n: i64, c: i64, h: i64, w: i64) -> Self {
        Self { n, c, h, w }
    }

    pub fn dims(&self) -> [i64; 4] {
        [self.n, self.c, self.h, self.w]
    }

    pub fn validate(&self) -> IrResult<()> {
        if self.dims().iter().all(|d| *d > 0) {
            Ok(())
        } else {
            Err(IrError::InvalidShape(*self))
        }
    }

    pub fn to_shape(&self) -> IrResult<Shape> {
        self.validate()?;
        let dims = self
            .dims()
            .iter()
            .map(|d| usize::try_from(*d).map_err(|_| IrError::InvalidShape(*self)))
            .collect::<IrResult<Vec<_>>>()?;
        Ok(Shape::from_slice(&dims))
    }
}

impl Default for TensorShape {
    fn default() -> Self {
        Self::new(1, 3, 224, 224)
    }
}

/// Renders as `N,C,H,W`, the form used by the `data shape` attribute.
impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.n, self.c, self.h, self.w)
    }
}

impl FromStr for TensorShape {
    type Err = IrError;

    fn from_str(raw: &str) -> IrResult<Self> {
        let dims = raw
            .split(',')
            .map(|d| d.trim().parse::<i64>().map_err(parse_err))
            .collect::<IrResult<Vec<_>>>()?;
        match dims.as_slice() {
            [n, c, h, w] => Ok(Self::new(*n, *c, *h, *w)),
            _ => Err(IrError::Parse(format!(
                "expected 4 comma-separated dims, got {}",
                dims.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders() {
        let shape: TensorShape = "1, 3,224,224".parse().unwrap();
        assert_eq!(shape, TensorShape::default());
        assert_eq!(shape.to_string(), "1,3,224,224");
    }

    #[test]
    fn rejects_wrong_rank() {
        assert!(matches!(
            "1,3,224".parse::<TensorShape>(),
            Err(IrError::Parse(_))
        ));
        assert!("1,3,x,4".parse::<TensorShape>().is_err());
    }

    #[test]
    fn non_positive_dims_are_invalid() {
        for shape in [
            TensorShape::new(0, 3, 224, 224),
            TensorShape::new(1, -3, 224, 224),
            TensorShape::new(1, 3, 224, 0),
        ] {
            assert!(matches!(shape.validate(), Err(IrError::InvalidShape(s)) if s == shape));
        }
    }

    #[test]
    fn converts_to_core_shape() {
        let shape = TensorShape::new(2, 3, 4, 5).to_shape().unwrap();
        assert_eq!(shape.rank(), 4);
        assert_eq!(shape.numel().unwrap(), 120);
    }
}
