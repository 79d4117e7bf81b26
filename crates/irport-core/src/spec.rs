#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

#[derive(Clone, Debug)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: super::DType,
    pub rank: usize,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    /// Concrete dims, or `None` if any dimension is dynamic.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().copied().collect()
    }
}

#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub name: String,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}
