/// Build a `Vec<Field>` from `key => value` pairs.
///
/// Values only need to implement `Display`.
///
/// # Usage
/// ```
/// use redlease_common::fields;
///
/// let fields = fields!["key" => "orders", "lease_ms" => 500];
/// assert_eq!(fields.len(), 2);
/// assert_eq!(fields[1].value, "500");
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        ::std::vec::Vec::<$crate::logging::Field>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        vec![$($crate::logging::Field::new($key, $value)),+]
    };
}
