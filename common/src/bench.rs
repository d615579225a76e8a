use core::fmt::Debug;

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::Result;

use crate::axis::{Point, SweepPlan};

/// A fully resolved benchmark invocation for one experiment point
#[derive(Debug, Clone)]
pub struct Cmd {
    pub point: Point,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CmdsResult {
    pub program: String,
    pub file_name: String,
    pub cmds: Vec<Cmd>,
}

#[typetag::serde(tag = "type")]
pub trait Bench: Debug + DynClone + Downcast + Send + Sync {
    /// Name of the benchmark, for identification
    fn name(&self) -> &'static str;
    fn default_bench() -> Box<dyn Bench>
    where
        Self: Sized;
    /// Path of the benchmark executable
    fn program(&self) -> &str;
    /// The axes this benchmark sweeps over
    fn plan(&self) -> Result<SweepPlan>;
    /// Command line for one experiment point, one flag/value pair per axis in a fixed order
    fn args(&self, point: &Point) -> Result<Vec<String>>;

    /// Every invocation of the sweep, in sweep order
    fn cmds(&self) -> Result<CmdsResult> {
        let plan = self.plan()?;
        let cmds = plan
            .points()
            .into_iter()
            .map(|point| {
                let args = self.args(&point)?;
                Ok(Cmd { point, args })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CmdsResult {
            program: self.program().to_owned(),
            file_name: plan.file_name,
            cmds,
        })
    }
}
clone_trait_object!(Bench);
impl_downcast!(Bench);
