use std::time::Duration;

use tierjit::utils::profiler::Profiler;

#[test]
fn profiler_records_named_phases() {
    let mut profiler = Profiler::new();
    profiler.record_phase("dummy", || std::thread::sleep(Duration::from_millis(1)));
    assert_eq!(profiler.phases().len(), 1);
    assert_eq!(profiler.phases()[0].name, "dummy");
    assert!(profiler.phases()[0].duration >= Duration::from_millis(1));
}

#[test]
fn profiler_returns_closure_result_and_sums_phases() {
    let mut profiler = Profiler::new();
    let value = profiler.record_phase("Lexing", || 7);
    profiler.push_phase("Parsing", Duration::from_millis(3));
    profiler.push_phase("Execution", Duration::from_millis(4));

    assert_eq!(value, 7);
    let names: Vec<&str> = profiler.phases().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Lexing", "Parsing", "Execution"]);
    assert!(profiler.total() >= Duration::from_millis(7));
}
