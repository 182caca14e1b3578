//! Data layouts and the canonical (channel-first) permutation table.
//!
//! Every supported `DataFormat` maps to a static permutation that reorders
//! its axes into canonical `[N, C, spatial...]` order. `from_canonical`
//! applies the inverse permutation, so the two compose to the identity.

use serde::{Deserialize, Serialize};

use crate::{OpdiffError, Result, Shape, Tensor};

static IDENTITY: [usize; 5] = [0, 1, 2, 3, 4];

/// Declared axis order of a pooling input/output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    #[serde(rename = "NCW")]
    Ncw,
    #[serde(rename = "NWC")]
    Nwc,
    #[serde(rename = "NCHW")]
    Nchw,
    #[serde(rename = "NHWC")]
    Nhwc,
    #[serde(rename = "NCDHW")]
    Ncdhw,
    #[serde(rename = "NDHWC")]
    Ndhwc,
}

impl DataFormat {
    pub const ALL: [DataFormat; 6] = [
        DataFormat::Ncw,
        DataFormat::Nwc,
        DataFormat::Nchw,
        DataFormat::Nhwc,
        DataFormat::Ncdhw,
        DataFormat::Ndhwc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataFormat::Ncw => "NCW",
            DataFormat::Nwc => "NWC",
            DataFormat::Nchw => "NCHW",
            DataFormat::Nhwc => "NHWC",
            DataFormat::Ncdhw => "NCDHW",
            DataFormat::Ndhwc => "NDHWC",
        }
    }

    /// Canonical axis `i` is declared axis `to_canonical_perm()[i]`.
    pub fn to_canonical_perm(self) -> &'static [usize] {
        match self {
            DataFormat::Ncw | DataFormat::Nchw | DataFormat::Ncdhw => {
                &IDENTITY[..self.ndim()]
            }
            DataFormat::Nwc => &[0, 2, 1],
            DataFormat::Nhwc => &[0, 3, 1, 2],
            DataFormat::Ndhwc => &[0, 4, 1, 2, 3],
        }
    }

    /// Declared axis `i` is canonical axis `from_canonical_perm()[i]`.
    pub fn from_canonical_perm(self) -> &'static [usize] {
        match self {
            DataFormat::Ncw | DataFormat::Nchw | DataFormat::Ncdhw => {
                &IDENTITY[..self.ndim()]
            }
            DataFormat::Nwc => &[0, 2, 1],
            DataFormat::Nhwc => &[0, 2, 3, 1],
            DataFormat::Ndhwc => &[0, 2, 3, 4, 1],
        }
    }

    /// Number of pooled (spatial) axes.
    pub fn spatial_rank(self) -> usize {
        match self {
            DataFormat::Ncw | DataFormat::Nwc => 1,
            DataFormat::Nchw | DataFormat::Nhwc => 2,
            DataFormat::Ncdhw | DataFormat::Ndhwc => 3,
        }
    }

    /// Full tensor rank: batch + channel + spatial axes.
    pub fn ndim(self) -> usize {
        self.spatial_rank() + 2
    }

    pub fn is_channel_last(self) -> bool {
        matches!(self, DataFormat::Nwc | DataFormat::Nhwc | DataFormat::Ndhwc)
    }

    /// Position of the channel axis in the declared layout.
    pub fn channel_axis(self) -> usize {
        if self.is_channel_last() {
            self.ndim() - 1
        } else {
            1
        }
    }

    /// Positions of the spatial axes in the declared layout, outermost first.
    pub fn spatial_axes(self) -> std::ops::Range<usize> {
        if self.is_channel_last() {
            1..self.ndim() - 1
        } else {
            2..self.ndim()
        }
    }

    /// The format of the given spatial rank and channel placement.
    pub fn for_rank(spatial_rank: usize, channel_last: bool) -> Result<DataFormat> {
        match (spatial_rank, channel_last) {
            (1, false) => Ok(DataFormat::Ncw),
            (1, true) => Ok(DataFormat::Nwc),
            (2, false) => Ok(DataFormat::Nchw),
            (2, true) => Ok(DataFormat::Nhwc),
            (3, false) => Ok(DataFormat::Ncdhw),
            (3, true) => Ok(DataFormat::Ndhwc),
            _ => Err(OpdiffError::Configuration(format!(
                "no data format with spatial rank {spatial_rank}"
            ))),
        }
    }

    /// Shape of a declared-layout tensor in canonical order.
    pub fn canonical_shape(self, declared: &Shape) -> Result<Shape> {
        self.check_rank(declared)?;
        Ok(declared.permuted(self.to_canonical_perm()))
    }

    fn check_rank(self, shape: &Shape) -> Result<()> {
        if shape.ndim() != self.ndim() {
            return Err(OpdiffError::Configuration(format!(
                "data_format {} expects a rank-{} tensor, got shape {}",
                self,
                self.ndim(),
                shape
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataFormat {
    type Err = OpdiffError;

    fn from_str(s: &str) -> Result<Self> {
        DataFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| OpdiffError::Configuration(format!("unsupported data_format {s:?}")))
    }
}

/// Permute a declared-layout tensor into canonical channel-first order.
pub fn to_canonical(tensor: &Tensor, format: DataFormat) -> Result<Tensor> {
    format.check_rank(tensor.shape())?;
    tensor.transpose(format.to_canonical_perm())
}

/// Permute a canonical channel-first tensor back into the declared layout.
pub fn from_canonical(tensor: &Tensor, format: DataFormat) -> Result<Tensor> {
    format.check_rank(tensor.shape())?;
    tensor.transpose(format.from_canonical_perm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_perms_are_inverse() {
        for f in DataFormat::ALL {
            let to = f.to_canonical_perm();
            let from = f.from_canonical_perm();
            assert_eq!(to.len(), f.ndim());
            for i in 0..f.ndim() {
                assert_eq!(to[from[i]], i, "{f}");
                assert_eq!(from[to[i]], i, "{f}");
            }
        }
    }

    #[test]
    fn test_canonical_shape() {
        let s = DataFormat::Nwc.canonical_shape(&Shape::new(vec![1, 8, 3])).unwrap();
        assert_eq!(s, Shape::new(vec![1, 3, 8]));
        let s = DataFormat::Nhwc.canonical_shape(&Shape::new(vec![1, 6, 7, 3])).unwrap();
        assert_eq!(s, Shape::new(vec![1, 3, 6, 7]));
        let s = DataFormat::Ndhwc
            .canonical_shape(&Shape::new(vec![2, 4, 5, 6, 3]))
            .unwrap();
        assert_eq!(s, Shape::new(vec![2, 3, 4, 5, 6]));
        let s = DataFormat::Ncdhw
            .canonical_shape(&Shape::new(vec![2, 3, 4, 5, 6]))
            .unwrap();
        assert_eq!(s, Shape::new(vec![2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_rank_mismatch_is_configuration_error() {
        let err = DataFormat::Nchw
            .canonical_shape(&Shape::new(vec![1, 3, 8]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_channel_and_spatial_axes() {
        assert_eq!(DataFormat::Nhwc.channel_axis(), 3);
        assert_eq!(DataFormat::Nhwc.spatial_axes(), 1..3);
        assert_eq!(DataFormat::Ncdhw.channel_axis(), 1);
        assert_eq!(DataFormat::Ncdhw.spatial_axes(), 2..5);
    }

    #[test]
    fn test_parse() {
        for f in DataFormat::ALL {
            assert_eq!(f.as_str().parse::<DataFormat>().unwrap(), f);
        }
        assert!("NCWH".parse::<DataFormat>().unwrap_err().is_configuration());
        assert!("ncw".parse::<DataFormat>().is_err());
    }

    #[test]
    fn test_for_rank() {
        assert_eq!(DataFormat::for_rank(2, true).unwrap(), DataFormat::Nhwc);
        assert!(DataFormat::for_rank(4, false).is_err());
    }

    #[test]
    fn test_serde_uses_layout_names() {
        let json = serde_json::to_string(&DataFormat::Ndhwc).unwrap();
        assert_eq!(json, "\"NDHWC\"");
    }

    fn format_and_tensor() -> impl Strategy<Value = (DataFormat, Tensor)> {
        prop::sample::select(DataFormat::ALL.to_vec()).prop_flat_map(|f| {
            prop::collection::vec(1usize..=4, f.ndim()).prop_map(move |dims| {
                let shape = Shape::new(dims);
                let data = (0..shape.numel()).map(|i| i as f32).collect();
                (f, Tensor::from_vec(data, shape).unwrap())
            })
        })
    }

    proptest! {
        /// Forward then backward permutation is the identity.
        #[test]
        fn round_trip_is_identity((f, t) in format_and_tensor()) {
            let canonical = to_canonical(&t, f).unwrap();
            prop_assert_eq!(canonical.shape(), &f.canonical_shape(t.shape()).unwrap());
            let back = from_canonical(&canonical, f).unwrap();
            prop_assert_eq!(back, t);
        }
    }
}
