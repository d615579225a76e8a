use std::path::PathBuf;

use common::{
    axis::{Axis, AxisKind, Point, SweepPlan},
    axis_enum,
    bench::Bench,
};
use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

axis_enum! {
    pub enum HierarchyType: "hierarchy", segment = Label {
        Nvm => (1, "nvm"),
        DramNvm => (2, "dram-nvm"),
        DramSsd => (3, "dram-ssd"),
        DramNvmSsd => (4, "dram-nvm-ssd"),
    }
}

axis_enum! {
    pub enum CachingType: "caching", segment = Label {
        Fifo => (1, "fifo"),
        Lru => (2, "lru"),
        Lfu => (3, "lfu"),
        Arc => (4, "arc"),
    }
}

axis_enum! {
    /// Latency of the slower tiers relative to DRAM
    pub enum LatencyType: "latency", segment = Code {
        TwoFour => (1, "2x-4x"),
        TwoTen => (2, "2x-10x"),
        FourFour => (3, "4x-4x"),
        FourTen => (4, "4x-10x"),
        TenTen => (5, "10x-10x"),
    }
}

axis_enum! {
    pub enum SizeType: "size", segment = Code {
        One => (1, "1"),
        Two => (2, "2"),
        Three => (3, "3"),
        Four => (4, "4"),
    }
}

axis_enum! {
    pub enum TraceType: "trace", segment = Label {
        Tpcc => (1, "tpcc"),
    }
}

pub const DEFAULT_HIERARCHY: HierarchyType = HierarchyType::Nvm;
pub const DEFAULT_CACHING: CachingType = CachingType::Lru;
pub const DEFAULT_LATENCY: LatencyType = LatencyType::TwoFour;
pub const DEFAULT_SIZE: SizeType = SizeType::Four;
pub const DEFAULT_TRACE: TraceType = TraceType::Tpcc;
pub const DEFAULT_MIGRATION_FREQUENCY: u32 = 3;
pub const SCALE_FACTOR: u64 = 10;
pub const DEFAULT_OPERATION_COUNT: u64 = 100_000 * SCALE_FACTOR;

/// Hierarchies containing NVM
pub const NVM_HIERARCHIES: &[HierarchyType] = &[
    HierarchyType::Nvm,
    HierarchyType::DramNvm,
    HierarchyType::DramNvmSsd,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineExperiment {
    /// Throughput over latency types, one line per hierarchy
    #[default]
    Latency,
    /// Throughput over size types, one bar group per hierarchy
    Size,
}

/// Cache hierarchy simulator driven by a storage trace.
///
/// Axes left unset take the experiment's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Machine {
    pub program: String,
    /// Holds `<trace>.txt` for every trace type
    pub trace_dir: PathBuf,
    pub experiment: MachineExperiment,
    pub traces: Option<Vec<TraceType>>,
    pub caching: Option<Vec<CachingType>>,
    pub sizes: Option<Vec<SizeType>>,
    pub latencies: Option<Vec<LatencyType>>,
    pub hierarchies: Option<Vec<HierarchyType>>,
    pub migration_frequency: u32,
    pub operation_count: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            program: "build/test/machine".to_owned(),
            trace_dir: PathBuf::from("traces"),
            experiment: MachineExperiment::default(),
            traces: None,
            caching: None,
            sizes: None,
            latencies: None,
            hierarchies: None,
            migration_frequency: DEFAULT_MIGRATION_FREQUENCY,
            operation_count: DEFAULT_OPERATION_COUNT,
        }
    }
}

fn values<T: AxisKind>(set: &Option<Vec<T>>, default: &[T]) -> Result<Vec<T>> {
    let values = set.clone().unwrap_or_else(|| default.to_vec());
    if values.is_empty() {
        bail!("Axis {} has no values", T::AXIS);
    }
    Ok(values)
}

impl Machine {
    pub fn traces(&self) -> Result<Vec<TraceType>> {
        values(&self.traces, &[DEFAULT_TRACE])
    }

    pub fn caching(&self) -> Result<Vec<CachingType>> {
        values(&self.caching, &[DEFAULT_CACHING])
    }

    pub fn sizes(&self) -> Result<Vec<SizeType>> {
        match self.experiment {
            MachineExperiment::Latency => values(&self.sizes, &[DEFAULT_SIZE]),
            MachineExperiment::Size => values(&self.sizes, SizeType::ALL),
        }
    }

    pub fn latencies(&self) -> Result<Vec<LatencyType>> {
        match self.experiment {
            MachineExperiment::Latency => values(&self.latencies, LatencyType::ALL),
            MachineExperiment::Size => values(&self.latencies, &[DEFAULT_LATENCY]),
        }
    }

    pub fn hierarchies(&self) -> Result<Vec<HierarchyType>> {
        match self.experiment {
            MachineExperiment::Latency => values(&self.hierarchies, NVM_HIERARCHIES),
            MachineExperiment::Size => values(
                &self.hierarchies,
                &[
                    HierarchyType::DramNvm,
                    HierarchyType::DramSsd,
                    HierarchyType::DramNvmSsd,
                ],
            ),
        }
    }

    pub fn trace_file(&self, trace: &str) -> PathBuf {
        self.trace_dir.join(format!("{trace}.txt"))
    }
}

#[typetag::serde]
impl Bench for Machine {
    fn name(&self) -> &'static str {
        "machine"
    }

    fn default_bench() -> Box<dyn Bench> {
        Box::new(Self::default())
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn plan(&self) -> Result<SweepPlan> {
        let trace = Axis::from_kinds("Trace", &self.traces()?);
        let caching = Axis::from_kinds("Caching Types", &self.caching()?);
        let hierarchy = Axis::from_kinds("Hierarchy Types", &self.hierarchies()?);
        let size = Axis::from_kinds("Size Types", &self.sizes()?);
        let latency = Axis::from_kinds("Latency Types", &self.latencies()?);

        Ok(match self.experiment {
            MachineExperiment::Latency => SweepPlan {
                dirs: vec![trace, caching, size, hierarchy],
                varying: latency,
                file_name: "latency.csv".to_owned(),
            },
            MachineExperiment::Size => SweepPlan {
                dirs: vec![trace, caching, latency, hierarchy],
                varying: size,
                file_name: "size.csv".to_owned(),
            },
        })
    }

    fn args(&self, point: &Point) -> Result<Vec<String>> {
        let code = |axis: &str| point.value(axis).map(|v| v.code.clone());
        let trace = point.value(TraceType::AXIS)?;
        Ok(vec![
            "-a".to_owned(),
            code(HierarchyType::AXIS)?,
            "-l".to_owned(),
            code(LatencyType::AXIS)?,
            "-s".to_owned(),
            code(SizeType::AXIS)?,
            "-c".to_owned(),
            code(CachingType::AXIS)?,
            "-f".to_owned(),
            self.trace_file(&trace.label).to_string_lossy().into_owned(),
            "-m".to_owned(),
            self.migration_frequency.to_string(),
            "-o".to_owned(),
            self.operation_count.to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_machine() -> Machine {
        Machine {
            experiment: MachineExperiment::Size,
            ..Default::default()
        }
    }

    #[test]
    fn latency_plan_defaults() {
        let plan = Machine::default().plan().unwrap();
        assert_eq!(plan.file_name, "latency.csv");
        assert_eq!(plan.varying.labels(), vec!["2x-4x", "2x-10x", "4x-4x", "4x-10x", "10x-10x"]);
        assert_eq!(plan.dirs[3].labels(), vec!["nvm", "dram-nvm", "dram-nvm-ssd"]);
        assert_eq!(plan.len(), 15);

        let points = plan.points();
        assert_eq!(points[0].segments(), vec!["tpcc", "lru", "4", "nvm"]);
        assert_eq!(points[4].x.code, "5");
        assert_eq!(points[5].segments(), vec!["tpcc", "lru", "4", "dram-nvm"]);
        assert_eq!(points[5].x.code, "1");
    }

    #[test]
    fn size_plan_defaults() {
        let plan = size_machine().plan().unwrap();
        assert_eq!(plan.file_name, "size.csv");
        assert_eq!(plan.varying.labels(), vec!["1", "2", "3", "4"]);
        assert_eq!(plan.dirs[2].name, "latency");
        assert_eq!(
            plan.dirs[3].labels(),
            vec!["dram-nvm", "dram-ssd", "dram-nvm-ssd"]
        );
        assert_eq!(plan.points()[0].segments(), vec!["tpcc", "lru", "1", "dram-nvm"]);
        assert_eq!(plan.len(), 12);
    }

    #[test]
    fn command_line_order() {
        let machine = Machine {
            trace_dir: PathBuf::from("/traces"),
            ..size_machine()
        };
        let cmds = machine.cmds().unwrap();
        assert_eq!(cmds.program, "build/test/machine");
        assert_eq!(cmds.cmds.len(), 12);
        assert_eq!(
            cmds.cmds[1].args,
            vec![
                "-a", "2", "-l", "1", "-s", "2", "-c", "2", "-f", "/traces/tpcc.txt", "-m", "3",
                "-o", "1000000"
            ]
        );
    }

    #[test]
    fn overrides_from_yaml() {
        let machine: Machine = serde_yml::from_str(
            "
program: ./machine
experiment: latency
caching: [fifo, arc]
latencies: [4x-10x]
hierarchies: [dram-ssd]
operation_count: 10
",
        )
        .unwrap();
        let plan = machine.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.points()[1].segments(), vec!["tpcc", "arc", "4", "dram-ssd"]);

        let args = machine.args(&plan.points()[0]).unwrap();
        assert_eq!(args[1], "3");
        assert_eq!(args[3], "4");
        assert_eq!(args[7], "1");
        assert_eq!(args[13], "10");
    }

    #[test]
    fn empty_axis_is_rejected() {
        let machine = Machine {
            sizes: Some(Vec::new()),
            ..Default::default()
        };
        assert!(machine.plan().is_err());
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert!(serde_yml::from_str::<Machine>("hierarchies: [tape]").is_err());
    }
}
