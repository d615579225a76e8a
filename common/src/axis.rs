use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AxisError {
    #[error("Experiment point has no value for axis {0}")]
    MissingAxis(String),
}

/// Which representation of an axis value names its result directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Code,
    Label,
}

/// One value of a configuration axis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisValue {
    pub axis: String,
    /// Passed on the command line and written as the independent variable
    pub code: String,
    /// Shown on charts
    pub label: String,
    /// Result directory name
    pub segment: String,
}

impl AxisValue {
    pub fn new(axis: &str, code: impl ToString, label: impl ToString, segment: Segment) -> Self {
        let code = code.to_string();
        let label = label.to_string();
        let segment = match segment {
            Segment::Code => code.clone(),
            Segment::Label => label.clone(),
        };
        Self {
            axis: axis.to_owned(),
            code,
            label,
            segment,
        }
    }
}

/// An enumerated axis declared with [`axis_enum!`]
pub trait AxisKind: Copy {
    const AXIS: &'static str;
    const SEGMENT: Segment;

    fn code(&self) -> String;
    fn label(&self) -> &'static str;

    fn value(&self) -> AxisValue {
        AxisValue::new(Self::AXIS, self.code(), self.label(), Self::SEGMENT)
    }
}

/// Declares an enumerated configuration axis.
///
/// Every variant maps to a command line code and a display label. The label is also the
/// serialized name, so configs refer to values the same way charts print them.
///
/// ```ignore
/// axis_enum! {
///     pub enum CachingType: "caching", segment = Label {
///         Fifo => (1, "fifo"),
///         Lru => (2, "lru"),
///     }
/// }
/// ```
#[macro_export]
macro_rules! axis_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $axis:literal, segment = $seg:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($code:literal, $label:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl $crate::axis::AxisKind for $name {
            const AXIS: &'static str = $axis;
            const SEGMENT: $crate::axis::Segment = $crate::axis::Segment::$seg;

            fn code(&self) -> String {
                match self {
                    $($name::$variant => $code.to_string()),+
                }
            }

            fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", $crate::axis::AxisKind::label(self))
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    /// Chart axis title when this axis is the independent variable
    pub title: String,
    pub values: Vec<AxisValue>,
}

impl Axis {
    pub fn new(name: &str, title: &str, values: Vec<AxisValue>) -> Self {
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            values,
        }
    }

    pub fn from_kinds<T: AxisKind>(title: &str, values: &[T]) -> Self {
        Self::new(T::AXIS, title, values.iter().map(|v| v.value()).collect())
    }

    pub fn labels(&self) -> Vec<String> {
        self.values.iter().map(|v| v.label.clone()).collect()
    }
}

/// One concrete combination of axis values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    /// Values that name the result file, outermost first
    pub dirs: Vec<AxisValue>,
    /// Value of the varying axis
    pub x: AxisValue,
}

impl Point {
    pub fn value(&self, axis: &str) -> Result<&AxisValue, AxisError> {
        self.dirs
            .iter()
            .chain(std::iter::once(&self.x))
            .find(|v| v.axis == axis)
            .ok_or_else(|| AxisError::MissingAxis(axis.to_owned()))
    }

    pub fn segments(&self) -> Vec<&str> {
        self.dirs.iter().map(|v| v.segment.as_str()).collect()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self
            .dirs
            .iter()
            .chain(std::iter::once(&self.x))
            .map(|v| format!("{}={}", v.axis, v.label))
            .collect::<Vec<_>>();
        write!(f, "{}", values.join(" "))
    }
}

/// The experiment points of one sweep.
///
/// Directory axes are iterated outermost first and the varying axis innermost, so each
/// result file receives its rows in varying-axis order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    pub dirs: Vec<Axis>,
    pub varying: Axis,
    pub file_name: String,
}

impl SweepPlan {
    /// Directory axis combinations, one per result file
    pub fn groups(&self) -> Vec<Vec<AxisValue>> {
        if self.dirs.is_empty() {
            return vec![vec![]];
        }
        self.dirs
            .iter()
            .map(|axis| axis.values.iter().cloned())
            .multi_cartesian_product()
            .collect()
    }

    pub fn points(&self) -> Vec<Point> {
        self.groups()
            .into_iter()
            .flat_map(|dirs| {
                self.varying.values.iter().map(move |x| Point {
                    dirs: dirs.clone(),
                    x: x.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups().len() * self.varying.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
