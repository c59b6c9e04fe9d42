use cm_results::{ReferenceTrace, compare_membrane_potential};

#[test]
fn load_reference_from_files() {
    let dir = std::env::temp_dir().join("cm_results_reference_files");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let states = dir.join("states.csv");
    let times = dir.join("times.csv");
    // One sample per column, as exported by the reference implementation.
    std::fs::write(&states, "-0.07,-0.06,-0.05\n0.1,0.1,0.1\n").unwrap();
    std::fs::write(&times, "0.0\n0.5\n1.0\n").unwrap();

    let reference = ReferenceTrace::load(&states, &times).unwrap();
    assert_eq!(reference.times, vec![0.0, 0.5, 1.0]);
    assert_eq!(reference.states[1], vec![-0.06, 0.1]);

    let sim_t = [0.0, 1.0];
    let sim_vm = [-0.07, -0.05];
    let c = compare_membrane_potential(&sim_t, &sim_vm, &reference, 0).unwrap();
    assert_eq!(c.compared, 3);
    assert!(c.max_abs < 1e-12);
}

#[test]
fn missing_file_is_an_error() {
    let dir = std::env::temp_dir().join("cm_results_reference_missing");
    assert!(ReferenceTrace::load(&dir.join("nope.csv"), &dir.join("nope_t.csv")).is_err());
}
