//! End-to-end scheduling through the public runtime API.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::RwLock;
use radiance::{
    record, Collection, ExecutionPolicy, FlushStats, MutationBuffer, PipelineRef, RadianceError,
    RadianceResult, RuntimeConfig, ScratchStack, System, Table, Trigger, Universe,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Stages {
    first: u32,
    second: u32,
}

impl radiance::Component for Stages {
    const FAMILY: u32 = 1;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Level(f32);

impl radiance::Component for Level {
    const FAMILY: u32 = 2;
}

fn running(universe: &mut Universe) {
    universe.init().unwrap();
    universe.start().unwrap();
}

fn stages_table(rows: u32) -> Table<u32, Stages> {
    Table::from_rows((0..rows).map(|k| (k, Stages::default())))
}

#[test]
fn lower_priority_pipeline_completes_first() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe.add_table(main, "rows", stages_table(2_000)).unwrap();

    let late = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe
        .add_system(late, record::system::<u32, Stages, _>(|s| s.second = s.first * 10))
        .unwrap();
    let early = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe
        .add_system(early, record::system::<u32, Stages, _>(|s| s.first += 1))
        .unwrap();

    // Enabled late-first so enable order alone would run them backwards.
    universe.enable_pipeline(late, ExecutionPolicy::new(10, Trigger::Loop)).unwrap();
    universe.enable_pipeline(early, ExecutionPolicy::new(-10, Trigger::Loop)).unwrap();

    running(&mut universe);
    let report = universe.tick().unwrap();
    assert!(report.is_clean());
    let order: Vec<_> = report.passes.iter().map(|(pipeline, _)| *pipeline).collect();
    assert_eq!(order, vec![early, late]);
    assert_eq!(report.pass(early).unwrap().committed, 2_000);
    assert_eq!(report.total().rows, 4_000);
    assert_eq!(report.total().committed, 4_000);

    for (_, stages) in rows.read().table().iter() {
        assert_eq!(*stages, Stages { first: 1, second: 10 });
    }

    universe.tick().unwrap();
    for (_, stages) in rows.read().table().iter() {
        assert_eq!(*stages, Stages { first: 2, second: 20 });
    }
}

#[test]
fn event_pipelines_run_only_on_demand() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe.add_table(main, "rows", stages_table(10)).unwrap();

    let bump = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe
        .add_system(bump, record::system::<u32, Stages, _>(|s| s.first += 1))
        .unwrap();
    universe.enable_pipeline(bump, ExecutionPolicy::new(0, Trigger::Event)).unwrap();

    running(&mut universe);
    universe.tick().unwrap();
    assert!(rows.read().table().values().iter().all(|s| s.first == 0));

    assert!(universe.run_event(bump).unwrap().is_clean());
    assert!(rows.read().table().values().iter().all(|s| s.first == 1));

    let sender = universe.event_sender();
    std::thread::spawn(move || {
        sender.send(bump).unwrap();
        sender.send(bump).unwrap();
    })
    .join()
    .unwrap();

    universe.tick().unwrap();
    assert!(rows.read().table().values().iter().all(|s| s.first == 1));

    let dispatched = universe.dispatch_events();
    assert_eq!(dispatched.len(), 2);
    assert!(dispatched.iter().all(|(_, result)| result.is_ok()));
    assert!(rows.read().table().values().iter().all(|s| s.first == 3));
    assert!(universe.dispatch_events().is_empty());
}

#[test]
fn shared_collection_is_one_store() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let render = universe.create_program("render").unwrap();
    let physics = universe.create_program("physics").unwrap();
    let points = universe
        .add_table(render, "points", Table::from_rows([(1u32, Level(1.0)), (2, Level(2.0))]))
        .unwrap();

    universe.share_collection("render/points", "physics/points").unwrap();
    assert_eq!(
        universe.share_collection("render/points", "physics/points"),
        Err(RadianceError::AlreadyExists("physics/points".into()))
    );

    let fall = universe.add_pipeline(physics, "points", "points").unwrap();
    universe
        .add_system(fall, record::system::<u32, Level, _>(|level| level.0 -= 0.5))
        .unwrap();
    universe.enable_pipeline(fall, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    universe.tick().unwrap();

    let points = points.read();
    assert_eq!(points.table().values(), &[Level(0.5), Level(1.5)]);
    assert!(Arc::ptr_eq(
        &universe.collection("render/points").unwrap(),
        &universe.collection("physics/points").unwrap()
    ));
}

/// A foreign store that only accepts records: keeps a running total.
#[derive(Default)]
struct Totals {
    sum: f32,
    seen: u64,
}

impl Collection for Totals {
    fn count(&self) -> u64 {
        0
    }

    fn copy(&self, row: u64, _scratch: &mut ScratchStack) -> RadianceResult<()> {
        Err(RadianceError::DoesNotExist(format!("row {row}")))
    }

    fn mutate(&mut self, record: &[u8]) -> RadianceResult<()> {
        self.sum += record::value_of::<u32, Level>(record)?.0;
        self.seen += 1;
        Ok(())
    }
}

#[test]
fn external_collection_receives_selected_rows() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    universe
        .add_table(main, "levels", Table::from_rows((0u32..10).map(|k| (k, Level(k as f32)))))
        .unwrap();
    let totals = Arc::new(RwLock::new(Totals::default()));
    universe.add_collection(main, "totals", Arc::clone(&totals)).unwrap();

    let report = universe.add_pipeline(main, "levels", "totals").unwrap();
    universe
        .set_select(report, record::select::<u32, Level, _>(|key, _| key % 2 == 0))
        .unwrap();
    universe.enable_pipeline(report, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    let pass = universe.tick().unwrap().total();
    assert_eq!(pass.rows, 10);
    assert_eq!(pass.committed, 5);

    let totals = totals.read();
    assert_eq!(totals.seen, 5);
    assert!((totals.sum - 20.0).abs() < f32::EPSILON);
}

#[test]
fn one_pass_feeds_several_sinks() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    universe
        .add_table(main, "input", Table::from_rows([(1u32, Level(3.0)), (2, Level(4.0))]))
        .unwrap();
    let left = universe
        .add_table(main, "left", Table::from_rows([(1u32, Level(0.0)), (2, Level(0.0))]))
        .unwrap();
    let right = universe.add_table(main, "right", Table::<u32, Level>::new()).unwrap();

    let fan_out = universe.add_pipeline(main, "input", "left").unwrap();
    universe.add_sink(fan_out, "right").unwrap();
    assert!(matches!(
        universe.add_sink(fan_out, "right"),
        Err(RadianceError::AlreadyExists(_))
    ));
    universe.enable_pipeline(fan_out, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    let pass = universe.tick().unwrap().total();

    assert_eq!(left.read().table().values(), &[Level(3.0), Level(4.0)]);
    // Key writes into a table without those keys are reported per row.
    assert_eq!(pass.committed, 2);
    assert_eq!(pass.failed(), 2);
    assert!(right.read().table().is_empty());
}

#[test]
fn failing_rows_do_not_stop_the_tick() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe.add_table(main, "rows", stages_table(8)).unwrap();

    let picky = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe
        .add_system(
            picky,
            System::new(|scratch: &mut ScratchStack| {
                if record::key_of::<u32, Stages>(scratch.top()?)? == 3 {
                    return Err(RadianceError::IncompatibleDataTypes("row 3".into()));
                }
                record::update_top::<u32, Stages>(scratch, |s| s.first = 7)
            }),
        )
        .unwrap();
    universe.enable_pipeline(picky, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    let report = universe.tick().unwrap();
    let pass = report.pass(picky).unwrap();
    assert_eq!(pass.failed(), 1);
    assert_eq!(pass.failures[0].row, 3);
    assert_eq!(pass.committed, 7);

    let rows = rows.read();
    let table = rows.table();
    for (key, stages) in table.iter() {
        assert_eq!(stages.first, if *key == 3 { 0 } else { 7 });
    }
}

#[test]
fn disabled_and_removed_pipelines_stop_running() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe.add_table(main, "rows", stages_table(4)).unwrap();

    let bump = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe
        .add_system(bump, record::system::<u32, Stages, _>(|s| s.first += 1))
        .unwrap();
    universe.enable_pipeline(bump, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    universe.tick().unwrap();
    universe.disable_pipeline(bump).unwrap();
    universe.disable_pipeline(bump).unwrap();
    universe.tick().unwrap();
    assert!(rows.read().table().values().iter().all(|s| s.first == 1));

    universe.remove_pipeline(bump).unwrap();
    assert!(matches!(
        universe.enable_pipeline(bump, ExecutionPolicy::new(0, Trigger::Loop)),
        Err(RadianceError::DoesNotExist(_))
    ));
    assert!(matches!(universe.run_event(bump), Err(RadianceError::DoesNotExist(_))));
}

#[test]
fn generator_pipeline_inserts_rows() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe.add_table(main, "rows", Table::<u32, Level>::new()).unwrap();

    let spawn = universe.add_empty_pipeline(main).unwrap();
    universe.add_sink(spawn, "rows").unwrap();
    let next = Arc::new(std::sync::atomic::AtomicU32::new(0));
    universe
        .add_system(
            spawn,
            System::new(move |scratch: &mut ScratchStack| {
                let key = next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record::encode(scratch, &radiance::Mutation::Insert { key, value: Level(1.0) })
            }),
        )
        .unwrap();
    universe.enable_pipeline(spawn, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    for _ in 0..3 {
        universe.tick().unwrap();
    }
    let rows = rows.read();
    assert_eq!(rows.count(), 3);
    assert!(rows.table().find(&2).is_some());
}

#[test]
fn config_file_drives_the_universe() {
    let config = RuntimeConfig::from_toml_str("scratch_capacity = 16\nworker_threads = 1").unwrap();
    let mut universe = Universe::new(config).unwrap();
    let main = universe.create_program("main").unwrap();
    universe.add_table(main, "rows", stages_table(3)).unwrap();
    let copy = universe.add_pipeline(main, "rows", "rows").unwrap();
    universe.enable_pipeline(copy, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    // 24-byte header + 4-byte key + 8-byte value cannot fit in 16 bytes.
    let pass = universe.tick().unwrap().total();
    assert_eq!(pass.failed(), 3);
    assert!(pass
        .failures
        .iter()
        .all(|failure| failure.error == RadianceError::MemoryOutOfBounds));
}

#[test]
fn sources_are_read_in_lockstep() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    universe
        .add_table(main, "base", Table::from_rows([(0u32, Level(1.0)), (1, Level(2.0)), (2, Level(3.0))]))
        .unwrap();
    universe
        .add_table(main, "bonus", Table::from_rows([(7u32, Level(10.0)), (8, Level(20.0))]))
        .unwrap();
    let sums = universe
        .add_table(main, "sums", Table::from_rows((0u32..3).map(|k| (k, Level(0.0)))))
        .unwrap();

    let join = universe.add_pipeline(main, "base", "sums").unwrap();
    universe.add_source(join, "bonus").unwrap();
    assert!(matches!(universe.add_source(join, "bonus"), Err(RadianceError::AlreadyExists(_))));
    assert!(matches!(universe.add_source(join, "base"), Err(RadianceError::AlreadyExists(_))));

    // Stack holds [base row, bonus row]: fold the bonus into the base record.
    universe
        .add_system(
            join,
            System::new(|scratch: &mut ScratchStack| {
                let bonus = record::value_of::<u32, Level>(scratch.top()?)?;
                scratch.pop()?;
                record::update_top::<u32, Level>(scratch, |level| level.0 += bonus.0)
            }),
        )
        .unwrap();
    universe.enable_pipeline(join, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    let report = universe.tick().unwrap();
    let pass = report.pass(join).unwrap();
    assert!(pass.is_clean());
    assert_eq!(pass.rows, 2);
    assert_eq!(pass.committed, 2);
    assert_eq!(sums.read().table().values(), &[Level(11.0), Level(22.0), Level(0.0)]);

    universe
        .set_select(join, |records: &[&[u8]]| {
            records.len() == 2 && record::value_of::<u32, Level>(records[1]).is_ok_and(|bonus| bonus.0 > 15.0)
        })
        .unwrap();
    let report = universe.tick().unwrap();
    assert_eq!(report.pass(join).unwrap().committed, 1);
    assert_eq!(sums.read().table().values(), &[Level(11.0), Level(22.0), Level(0.0)]);
}

#[test]
fn foreign_pipeline_handles_do_not_exist() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let left = universe.create_program("left").unwrap();
    let right = universe.create_program("right").unwrap();
    let own = universe.add_empty_pipeline(left).unwrap();
    let other = universe.add_empty_pipeline(right).unwrap();
    assert_eq!(own.pipeline.raw(), other.pipeline.raw());

    let forged = PipelineRef {
        program: left,
        pipeline: other.pipeline,
    };
    let policy = ExecutionPolicy::new(0, Trigger::Loop);
    assert!(matches!(universe.disable_pipeline(forged), Err(RadianceError::DoesNotExist(_))));
    assert!(matches!(universe.enable_pipeline(forged, policy), Err(RadianceError::DoesNotExist(_))));
    assert!(matches!(
        universe.add_system(forged, System::new(|_: &mut ScratchStack| Ok(()))),
        Err(RadianceError::DoesNotExist(_))
    ));
    assert!(matches!(universe.remove_pipeline(forged), Err(RadianceError::DoesNotExist(_))));
    assert!(matches!(universe.run_event(forged), Err(RadianceError::DoesNotExist(_))));

    universe.enable_pipeline(own, policy).unwrap();
    universe.enable_pipeline(other, policy).unwrap();
    running(&mut universe);
    let report = universe.tick().unwrap();
    assert_eq!(report.passes.len(), 2);
    assert!(report.pass(forged).is_none());
}

#[test]
fn buffered_mutations_flush_after_each_tick() {
    let mut universe = Universe::new(RuntimeConfig::default()).unwrap();
    let main = universe.create_program("main").unwrap();
    let rows = universe
        .add_table(main, "rows", Table::from_rows((0u32..4).map(|k| (k, Level(k as f32)))))
        .unwrap();
    let buffer = Arc::new(MutationBuffer::new());
    universe.flush_after_tick(Arc::clone(&buffer), Arc::clone(&rows));

    let cull = universe.add_empty_pipeline(main).unwrap();
    universe.add_source(cull, "rows").unwrap();
    let requests = Arc::clone(&buffer);
    universe
        .add_system(
            cull,
            System::new(move |scratch: &mut ScratchStack| {
                let key = record::key_of::<u32, Level>(scratch.top()?)?;
                if key % 2 == 0 {
                    requests.remove(key);
                }
                Ok(())
            }),
        )
        .unwrap();
    universe.enable_pipeline(cull, ExecutionPolicy::new(0, Trigger::Loop)).unwrap();

    running(&mut universe);
    let first = universe.tick().unwrap();
    assert_eq!(first.pass(cull).unwrap().rows, 4);
    assert_eq!(first.flushed, FlushStats { applied: 2, rejected: 0 });
    assert!(buffer.is_empty());
    assert_eq!(rows.read().count(), 2);

    let second = universe.tick().unwrap();
    assert_eq!(second.pass(cull).unwrap().rows, 2);
    assert_eq!(second.flushed, FlushStats::default());
    let rows = rows.read();
    assert!(rows.table().find(&1).is_some());
    assert!(rows.table().find(&2).is_none());
}
