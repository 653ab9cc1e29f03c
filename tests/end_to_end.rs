//! End-to-end scenarios driven through a `TestConsole`: each feeds a
//! sequence of immediate-mode lines (as if typed at the prompt) and checks
//! what landed on the console before the session is closed with `BYE`.

use basic79::console::TestConsole;
use basic79::machine::Machine;

fn run_session(lines: &[&str]) -> String {
    let mut all_lines: Vec<&str> = lines.to_vec();
    all_lines.push("BYE");
    let mut machine = Machine::new(TestConsole::with_input(&all_lines));
    machine.run();
    machine.into_console().output
}

#[test]
fn prints_a_literal_string() {
    let out = run_session(&["10 PRINT \"HELLO\"", "RUN"]);
    assert!(out.contains("HELLO\r\n"));
}

#[test]
fn for_next_loop_counts_up() {
    let out = run_session(&["10 FOR I=1 TO 3", "20 PRINT I", "30 NEXT I", "RUN"]);
    assert!(out.contains(" 1 \r\n"));
    assert!(out.contains(" 2 \r\n"));
    assert!(out.contains(" 3 \r\n"));
}

#[test]
fn data_read_sums_three_values() {
    let out = run_session(&["10 DATA 1,2,3", "20 READ A,B,C", "30 PRINT A+B+C", "RUN"]);
    assert!(out.contains(" 6 \r\n"));
}

#[test]
fn user_function_squares_its_argument() {
    let out = run_session(&["10 DEF FNSQ(X)=X*X", "20 PRINT FNSQ(5)", "RUN"]);
    assert!(out.contains(" 25 \r\n"));
}

#[test]
fn if_then_else_picks_the_then_branch_on_truthy_condition() {
    let out = run_session(&["10 IF 1 THEN PRINT \"Y\" ELSE PRINT \"N\"", "RUN"]);
    assert!(out.contains("Y\r\n"));
    assert!(!out.contains("N\r\n"));
}

#[test]
fn input_prompts_and_prints_comma_aligned_reply() {
    let out = run_session(&["10 INPUT \"NAME\";A$", "20 PRINT \"HI \",A$", "RUN", "WORLD"]);
    assert!(out.contains("NAME? "));
    assert!(out.contains("HI "));
    assert!(out.contains("WORLD"));
}

#[test]
fn line_number_32768_is_rejected() {
    let out = run_session(&["32768 PRINT 1"]);
    assert!(out.contains("Line number is too large"));
}

#[test]
fn division_by_zero_reports_an_error() {
    let out = run_session(&["10 PRINT 1/0", "RUN"]);
    assert!(out.contains("Division by zero"));
}

#[test]
fn zero_iteration_for_loop_skips_its_body() {
    let out = run_session(&["10 FOR I=1 TO 0", "20 PRINT \"X\"", "30 NEXT I", "RUN"]);
    assert!(!out.contains('X'));
}

#[test]
fn empty_for_next_body_on_one_line_sleeps_roughly_the_iteration_count_in_milliseconds() {
    let start = std::time::Instant::now();
    let out = run_session(&["10 FOR I=1 TO 200:NEXT I", "RUN"]);
    let elapsed = start.elapsed();
    assert!(!out.contains("error"));
    assert!(elapsed.as_millis() >= 150);
}

#[test]
fn goto_to_a_missing_line_reports_an_error_with_the_line_number() {
    let out = run_session(&["10 GOTO 999", "RUN"]);
    assert!(out.contains("GOTO - line not found on line 10"));
}

#[test]
fn new_clears_a_previously_entered_program() {
    let out = run_session(&["10 PRINT \"HI\"", "NEW", "RUN"]);
    assert!(!out.contains("HI"));
}

#[test]
fn save_then_load_round_trips_a_program() {
    let dir = std::env::temp_dir().join(format!("basic79_test_{}", std::process::id()));
    let path = dir.with_extension("bas");
    let path_str = path.to_str().unwrap();

    let save_out = run_session(&["10 PRINT \"HELLO\"", &format!("SAVE \"{}\"", path_str)]);
    assert!(!save_out.contains("error"));

    let out = run_session(&[&format!("LOAD \"{}\"", path_str), "RUN"]);
    assert!(out.contains("HELLO\r\n"));

    let _ = std::fs::remove_file(path);
}
