pub use enclose::*;

#[macro_export]
macro_rules! derived {
    (( $($d_tt:tt)* ) $($b:tt)*) => {
        $crate::Derived::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::Derived::new(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! effect {
    (( $($d_tt:tt)* ) $($b:tt)*) => {
        $crate::Effect::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::Effect::new(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! memo {
    (( $($d_tt:tt)* ) $($b:tt)*) => {
        $crate::Memoized::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::Memoized::new(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! batch {
    (( $($d_tt:tt)* ) $($b:tt)*) => {
        $crate::batch($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::batch(move || { $($b)* })
    };
}
