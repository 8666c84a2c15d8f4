fn main() -> std::process::ExitCode {
  setbinder_lib::run()
}
