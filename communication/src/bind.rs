//! Bound closures (§4.4): packaging a function and its arguments so the
//! whole bundle can travel to another rank and be invoked there.
//!
//! Most arguments reify immediately off the wire (an integer, a `String`),
//! so most `bind` calls are cheap to invoke once deserialized. A few types
//! need more: a distributed object reference has to resolve against the
//! receiving rank's local share before it's usable, which is exactly what
//! [`Binding::reify`] is for.

/// How a type crosses the wire as a bound-closure argument.
///
/// The default blanket impl is for ordinary by-value types: `to_wire`
/// clones, `reify` hands the clone straight back. Types whose identity must
/// change in flight (distributed object references, teams, personas)
/// override both halves.
pub trait Binding: Sized {
    /// The on-wire representation sent in place of `self`.
    type Wire: Send + 'static;

    /// Produces the on-wire representation.
    fn to_wire(&self) -> Self::Wire;

    /// Reconstructs a usable value from the on-wire representation, on
    /// whichever rank received it.
    fn reify(wire: Self::Wire) -> Self;
}

impl<T: Clone + Send + 'static> Binding for T {
    type Wire = T;

    fn to_wire(&self) -> T {
        self.clone()
    }

    fn reify(wire: T) -> T {
        wire
    }
}

/// A function bundled with its arguments' on-wire representations.
///
/// `bind(f, a, b)` is `BoundFunction::new(f, (a, b))`; invoking it reifies
/// each argument and calls `f` with the results.
pub struct BoundFunction<F, W> {
    func: F,
    wire_args: W,
}

impl<F, A> BoundFunction<F, (A::Wire,)>
where
    A: Binding,
{
    /// Binds `func` to one argument.
    pub fn new1<R>(func: F, a: A) -> Self
    where
        F: Fn(A) -> R,
    {
        BoundFunction { func, wire_args: (a.to_wire(),) }
    }
}

impl<F, A, R> BoundFunction<F, (A::Wire,)>
where
    F: Fn(A) -> R,
    A: Binding,
{
    /// Reifies the bound argument and invokes `func`.
    pub fn invoke(self) -> R {
        let (wire_a,) = self.wire_args;
        (self.func)(A::reify(wire_a))
    }
}

impl<F, A, B> BoundFunction<F, (A::Wire, B::Wire)>
where
    A: Binding,
    B: Binding,
{
    /// Binds `func` to two arguments.
    pub fn new2<R>(func: F, a: A, b: B) -> Self
    where
        F: Fn(A, B) -> R,
    {
        BoundFunction { func, wire_args: (a.to_wire(), b.to_wire()) }
    }
}

impl<F, A, B, R> BoundFunction<F, (A::Wire, B::Wire)>
where
    F: Fn(A, B) -> R,
    A: Binding,
    B: Binding,
{
    /// Reifies both bound arguments and invokes `func`.
    pub fn invoke2(self) -> R {
        let (wire_a, wire_b) = self.wire_args;
        (self.func)(A::reify(wire_a), B::reify(wire_b))
    }
}

/// Binds a single-argument function to its argument.
///
/// Nested `bind(bind(f, a), b)` is not flattened automatically by this
/// helper (unlike the two-argument overloads above, there's no single
/// bound-closure type generic over arity in safe Rust without variadics);
/// call [`BoundFunction::new2`] directly for a two-argument bind instead of
/// composing two single-argument binds.
pub fn bind1<F, A, R>(func: F, a: A) -> BoundFunction<F, (A::Wire,)>
where
    F: Fn(A) -> R,
    A: Binding,
{
    BoundFunction::new1(func, a)
}

/// Binds a two-argument function to both its arguments.
pub fn bind2<F, A, B, R>(func: F, a: A, b: B) -> BoundFunction<F, (A::Wire, B::Wire)>
where
    F: Fn(A, B) -> R,
    A: Binding,
    B: Binding,
{
    BoundFunction::new2(func, a, b)
}
