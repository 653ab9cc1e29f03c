use basic79::console::RealConsole;
use basic79::machine::Machine;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut machine = Machine::new(RealConsole::new());

    if let Some(path) = args.get(1) {
        machine.load_and_run(path);
    }

    machine.run();
    println!("Bye!");
    std::process::exit(1);
}
