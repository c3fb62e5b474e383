//! Small f32 vector library used by the world compiler

use std::ops::{Add, AddAssign, BitXor, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign};

macro_rules! operator_on_variadic {
    ($operator: tt, $first: expr) => {
        $first
    };

    ($operator: tt, $first: expr, $($rest: expr),*) => {
        $first $operator operator_on_variadic!($operator, $($rest),*)
    };
}

macro_rules! impl_vecn_binary_operator {
    ($op_name: ident, $op_fn_name: ident, $struct_name: ident, $($x: ident),*) => {
        impl $op_name<$struct_name> for $struct_name {
            type Output = $struct_name;

            fn $op_fn_name(self, rhs: $struct_name) -> Self::Output {
                Self::Output { $( $x: $op_name::$op_fn_name(self.$x, rhs.$x), )* }
            }
        }

        impl $op_name<f32> for $struct_name {
            type Output = $struct_name;

            fn $op_fn_name(self, rhs: f32) -> Self::Output {
                Self::Output { $( $x: $op_name::$op_fn_name(self.$x, rhs), )* }
            }
        }
    }
}

macro_rules! impl_vecn_assignment_operator {
    ($op_name: ident, $op_fn_name: ident, $struct_name: ident, $($x: ident),*) => {
        impl $op_name<$struct_name> for $struct_name {
            fn $op_fn_name(&mut self, rhs: $struct_name) {
                $( $op_name::$op_fn_name(&mut self.$x, rhs.$x); )*
            }
        }

        impl $op_name<f32> for $struct_name {
            fn $op_fn_name(&mut self, rhs: f32) {
                $( $op_name::$op_fn_name(&mut self.$x, rhs); )*
            }
        }
    }
}

macro_rules! impl_vecn {
    ($struct_name: ident, $count: literal, $($x: ident),*) => {
        #[derive(Copy, Clone, Debug, Default, PartialEq)]
        pub struct $struct_name {
            $( pub $x: f32, )*
        }

        impl $struct_name {
            pub const fn new($($x: f32),*) -> Self {
                Self { $($x),* }
            }

            pub const fn from_single(value: f32) -> Self {
                Self { $($x: value),* }
            }

            pub const fn zero() -> Self {
                Self::from_single(0.0)
            }

            pub fn dot(self, rhs: Self) -> f32 {
                operator_on_variadic!(+, $(self.$x * rhs.$x),*)
            }

            pub fn length2(self) -> f32 {
                self.dot(self)
            }

            pub fn length(self) -> f32 {
                self.length2().sqrt()
            }

            /// Vector of unit length. Zero vectors produce NaN components.
            pub fn normalized(self) -> Self {
                self / self.length()
            }

            pub fn checked_normalized(self) -> Option<Self> {
                let len2 = self.length2();

                if len2 > f32::EPSILON {
                    Some(self / len2.sqrt())
                } else {
                    None
                }
            }

            /// Componentwise minimum
            pub fn min(self, rhs: Self) -> Self {
                Self { $( $x: self.$x.min(rhs.$x) ),* }
            }

            /// Componentwise maximum
            pub fn max(self, rhs: Self) -> Self {
                Self { $( $x: self.$x.max(rhs.$x) ),* }
            }

            pub fn as_array(self) -> [f32; $count] {
                [$( self.$x ),*]
            }
        }

        impl From<[f32; $count]> for $struct_name {
            fn from(array: [f32; $count]) -> Self {
                let [$($x),*] = array;

                Self { $($x),* }
            }
        }

        impl From<$struct_name> for [f32; $count] {
            fn from(value: $struct_name) -> Self {
                value.as_array()
            }
        }

        impl BitXor for $struct_name {
            type Output = f32;

            fn bitxor(self, rhs: $struct_name) -> f32 {
                self.dot(rhs)
            }
        }

        impl Neg for $struct_name {
            type Output = $struct_name;

            fn neg(self) -> Self::Output {
                Self { $( $x: -self.$x ),* }
            }
        }

        impl_vecn_binary_operator!(Add, add, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Sub, sub, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Mul, mul, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Div, div, $struct_name, $($x),*);

        impl_vecn_assignment_operator!(AddAssign, add_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(SubAssign, sub_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(MulAssign, mul_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(DivAssign, div_assign, $struct_name, $($x),*);
    }
}

impl_vecn!(Vec2f, 2, x, y);
impl_vecn!(Vec3f, 3, x, y, z);

impl Vec3f {
    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }
}

/// Cross product operator
impl Rem for Vec3f {
    type Output = Vec3f;

    fn rem(self, rhs: Self) -> Self::Output {
        self.cross(rhs)
    }
}

#[macro_export]
macro_rules! vec3f {
    ($x: expr, $y: expr, $z: expr $(,)?) => {
        $crate::math::Vec3f::new($x, $y, $z)
    };
}

#[macro_export]
macro_rules! vec2f {
    ($x: expr, $y: expr $(,)?) => {
        $crate::math::Vec2f::new($x, $y)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_follows_right_hand_rule() {
        let x = Vec3f::new(1.0, 0.0, 0.0);
        let y = Vec3f::new(0.0, 1.0, 0.0);

        assert_eq!(x % y, Vec3f::new(0.0, 0.0, 1.0));
        assert_eq!(y % x, Vec3f::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn dot_and_length() {
        let v = Vec3f::new(3.0, 4.0, 0.0);

        assert_eq!(v ^ Vec3f::new(1.0, 1.0, 1.0), 7.0);
        assert_eq!(v.length(), 5.0);
        assert_eq!(v.normalized(), Vec3f::new(0.6, 0.8, 0.0));
    }

    #[test]
    fn zero_vector_has_no_direction() {
        assert!(Vec3f::zero().checked_normalized().is_none());
        assert!(Vec3f::new(0.0, 2.0, 0.0).checked_normalized().is_some());
    }

    #[test]
    fn componentwise_bounds() {
        let a = Vec3f::new(1.0, -2.0, 3.0);
        let b = Vec3f::new(-1.0, 5.0, 3.5);

        assert_eq!(a.min(b), Vec3f::new(-1.0, -2.0, 3.0));
        assert_eq!(a.max(b), Vec3f::new(1.0, 5.0, 3.5));
        assert_eq!(Vec2f::new(1.0, 2.0) * 2.0 - Vec2f::from_single(1.0), Vec2f::new(1.0, 3.0));
    }
}
