use std::process;

fn main() {
    let matches = cargo_postbuild::args(None);

    match cargo_postbuild::run(None, matches) {
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(101)
        }
        Ok(ec) => process::exit(ec),
    }
}
