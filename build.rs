fn main() {
    // ESP-IDF link directives are only meaningful for device builds;
    // host builds (tests, tooling) never enable the espidf feature.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
