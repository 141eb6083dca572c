pub use enclose::enclose;

/// Build a [`Derived`](crate::Derived) signal, cloning the listed handles
/// into the derive function.
///
/// ```
/// use signal_graph::{derived, Mutable, Signal};
///
/// let a = Mutable::new(1);
/// let b = Mutable::new(2);
/// let sum = derived!((a, b) => a.get() + b.get());
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! derived {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Derived::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::Derived::new(move || { $($b)* })
    };
}

/// Start a [`Reaction`](crate::Reaction), cloning the listed handles into
/// the closure.
#[macro_export]
macro_rules! reaction {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Reaction::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::Reaction::new(move || { $($b)* })
    };
}
