//! Reference `fib`, compiled directly by rustc.
//!
//! This is the control for the Cranelift-generated `fib`: same recursion,
//! same C ABI, same symbol name. Built as a `staticlib` so it can be linked
//! against a C caller in place of the generated object, and as an `rlib`
//! so tests can call it directly.
//!
//! Addition wraps on overflow, which is what the generated `iadd` does on
//! a 32-bit integer.

#[no_mangle]
pub extern "C" fn fib(x: i32) -> i32 {
    if x <= 1 {
        return x;
    }
    fib(x - 1).wrapping_add(fib(x - 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_cases_return_input() {
        assert_eq!(fib(0), 0);
        assert_eq!(fib(1), 1);
    }

    #[test]
    fn negative_input_is_a_base_case() {
        assert_eq!(fib(-1), -1);
        assert_eq!(fib(-42), -42);
        assert_eq!(fib(i32::MIN), i32::MIN);
    }

    #[test]
    fn fib_of_ten() {
        assert_eq!(fib(10), 55);
    }

    #[test]
    fn recursion_law() {
        for x in 2..=25 {
            assert_eq!(fib(x), fib(x - 1) + fib(x - 2), "x = {}", x);
        }
    }

    #[test]
    fn known_values() {
        let expected = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610];
        for (x, &want) in expected.iter().enumerate() {
            assert_eq!(fib(x as i32), want);
        }
    }
}
