use std::{fs, os::unix::fs::PermissionsExt, path::Path};

use common::{
    config::Settings,
    sweep::{Sweep, SweepError},
};
use machine::{HierarchyType, LatencyType, Machine, MachineExperiment};
use tempfile::tempdir;

/// Reports `<hierarchy code> * 100 + <latency code>` as throughput
fn stub_machine(dir: &Path) -> String {
    let path = dir.join("machine");
    fs::write(&path, "#!/bin/sh\necho \"warmup done\"\necho \"$(($2 * 100 + $4)) 0.25\"\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_str().unwrap().to_owned()
}

fn settings(dir: &Path) -> Settings {
    Settings {
        results_dir: dir.join("results"),
        plots_dir: dir.join("images"),
        timeout_secs: 10,
        max_retries: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn latency_sweep_writes_one_file_per_hierarchy() {
    let dir = tempdir().unwrap();
    let machine = Machine {
        program: stub_machine(dir.path()),
        hierarchies: Some(vec![HierarchyType::Nvm, HierarchyType::DramNvmSsd]),
        latencies: Some(vec![LatencyType::TwoFour, LatencyType::FourTen]),
        ..Default::default()
    };
    let settings = settings(dir.path());
    let sweep = Sweep {
        name: "latency",
        bench: &machine,
        settings: &settings,
        repeat: 2,
    };

    let mut seen = Vec::new();
    let report = sweep
        .run(|point, result| seen.push((point.to_string(), result.runs)))
        .await
        .unwrap();

    assert_eq!(report.points, 4);
    assert_eq!(report.retries, 0);
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|(_, runs)| *runs == 2));
    assert_eq!(
        seen[0].0,
        "trace=tpcc caching=lru size=4 hierarchy=nvm latency=2x-4x"
    );

    let results = dir.path().join("results/latency/tpcc/lru/4");
    assert_eq!(
        report.files,
        vec![results.join("nvm/latency.csv"), results.join("dram-nvm-ssd/latency.csv")]
    );
    assert_eq!(
        fs::read_to_string(results.join("nvm/latency.csv")).unwrap(),
        "1 , 101.0\n4 , 104.0\n"
    );
    assert_eq!(
        fs::read_to_string(results.join("dram-nvm-ssd/latency.csv")).unwrap(),
        "1 , 401.0\n4 , 404.0\n"
    );

    let capture = dir.path().join("results/latency/output.txt");
    assert!(!capture.exists());
    assert!(!capture.with_extension("err").exists());
}

#[tokio::test]
async fn overflowing_stat_aborts_the_sweep() {
    let dir = tempdir().unwrap();
    let program = dir.path().join("machine");
    fs::write(
        &program,
        "#!/bin/sh\nif [ \"$4\" = 2 ]; then echo 1e309; else echo 500; fi\n",
    )
    .unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    let machine = Machine {
        program: program.to_str().unwrap().to_owned(),
        hierarchies: Some(vec![HierarchyType::Nvm]),
        latencies: Some(vec![LatencyType::TwoFour, LatencyType::TwoTen]),
        ..Default::default()
    };
    let settings = settings(dir.path());
    let sweep = Sweep {
        name: "latency",
        bench: &machine,
        settings: &settings,
        repeat: 1,
    };

    let err = sweep.run(|_, _| {}).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SweepError>(),
        Some(SweepError::InvalidStat(v)) if v == "1e309"
    ));
    let file = dir.path().join("results/latency/tpcc/lru/4/nvm/latency.csv");
    assert_eq!(fs::read_to_string(file).unwrap(), "1 , 500.0\n");
}

#[tokio::test]
async fn rerun_starts_from_empty_results() {
    let dir = tempdir().unwrap();
    let machine = Machine {
        program: stub_machine(dir.path()),
        experiment: MachineExperiment::Size,
        hierarchies: Some(vec![HierarchyType::DramSsd]),
        ..Default::default()
    };
    let settings = settings(dir.path());
    let stale = dir.path().join("results/size/stale/size.csv");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "9 , 9\n").unwrap();

    let sweep = Sweep {
        name: "size",
        bench: &machine,
        settings: &settings,
        repeat: 1,
    };
    sweep.run(|_, _| {}).await.unwrap();
    sweep.run(|_, _| {}).await.unwrap();

    assert!(!stale.exists());
    let file = dir.path().join("results/size/tpcc/lru/1/dram-ssd/size.csv");
    assert_eq!(
        fs::read_to_string(file).unwrap(),
        "1 , 301.0\n2 , 301.0\n3 , 301.0\n4 , 301.0\n"
    );
}
