use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Element kind of a volume, tagged with its NIfTI datatype code
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    #[default]
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl Datatype {
    pub fn code(self) -> i16 {
        match self {
            Datatype::U8 => 2,
            Datatype::I16 => 4,
            Datatype::I32 => 8,
            Datatype::F32 => 16,
            Datatype::F64 => 64,
            Datatype::U16 => 512,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(Datatype::U8),
            4 => Some(Datatype::I16),
            8 => Some(Datatype::I32),
            16 => Some(Datatype::F32),
            64 => Some(Datatype::F64),
            512 => Some(Datatype::U16),
            _ => None,
        }
    }

    /// Size of one sample in bytes
    pub fn size_of(self) -> usize {
        match self {
            Datatype::U8 => 1,
            Datatype::I16 | Datatype::U16 => 2,
            Datatype::I32 | Datatype::F32 => 4,
            Datatype::F64 => 8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    None,
    /// NIfTI intent code 1002
    Label,
}

impl Intent {
    pub fn code(self) -> i16 {
        match self {
            Intent::None => 0,
            Intent::Label => 1002,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    #[default]
    Binary,
    Truncate,
    BinaryInv,
    RangePass,
    Otsu,
    Li,
    MultiOtsu,
    LocalAdaptive,
    ManualDraw,
}

impl SegmentationMethod {
    /// Whether thresholds are derived from the volume's histogram on every run
    pub fn is_automatic(self) -> bool {
        matches!(
            self,
            SegmentationMethod::Otsu | SegmentationMethod::Li | SegmentationMethod::MultiOtsu
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    HistogramEqualization,
    Clahe,
    Gamma,
    Brighten,
    Darken,
    Sigmoid,
    GaussianSmooth,
    UnsharpMask,
    HistogramMatching,
    BiasField,
    Median,
}
