fn main() -> anyhow::Result<()> {
    let code = manim_launcher_lib::run()?;
    std::process::exit(code)
}
