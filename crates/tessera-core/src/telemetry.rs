/// Install the default `fmt` subscriber for binaries embedding the repository.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt().with_target(true).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_refused() {
        init_tracing();
        assert!(!init_tracing());
    }
}
