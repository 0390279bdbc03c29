//! Generates the Swift and Kotlin bindings for `consultkit-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
