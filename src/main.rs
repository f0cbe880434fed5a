use tierjit::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        let msg = e.to_string();
        // Front-end failures have already been rendered as diagnostics.
        if msg.contains("lexing failed") || msg.contains("parsing failed") {
            std::process::exit(1);
        }
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tierjit::cli::TierCli;
    use tierjit::codegen::{CodegenBackendType, CodegenOptLevel};

    #[test]
    fn jit_flags_are_parsed() {
        let cli = TierCli::parse_from([
            "tierjit",
            "--jit",
            "--threshold",
            "3",
            "--backend",
            "cranelift",
            "--opt-level",
            "aggressive",
            "demos/hot.tj",
        ]);
        assert!(cli.jit);
        assert_eq!(cli.path.to_string_lossy(), "demos/hot.tj");
        assert_eq!(cli.threshold, Some(3));
        assert_eq!(cli.backend, Some(CodegenBackendType::Cranelift));
        assert_eq!(cli.opt_level, Some(CodegenOptLevel::Aggressive));
        assert!(!cli.stats);
    }
}
