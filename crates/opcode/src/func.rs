//! Function codes for the call instructions (`CALL1`, `CALL2`, `CALLN`).
//!
//! The numbering is fixed by the upstream front end and is shared with the
//! opcode programs it emits; only a small subset is meaningful to the
//! differentiator, but the whole table is kept so that every program can at
//! least be named and printed.

use core::fmt;

/// A function code carried by the argument of a call instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FuncCode(u8);

impl fmt::Display for FuncCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FuncCode {
    /// Instantiates a function code from a raw value.
    ///
    /// Returns `None` if the value is not a declared function.
    #[inline]
    pub const fn new(code: u8) -> Option<Self> {
        if (code as usize) < FUNC_COUNT {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Instantiates a function code from the signed representation used
    /// inside opcode programs.
    #[inline]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 || raw >= FUNC_COUNT as i32 {
            None
        } else {
            Some(Self(raw as u8))
        }
    }

    /// Returns the function name.
    #[inline]
    pub const fn name(self) -> &'static str {
        FUNC_NAMES[self.0 as usize]
    }

    /// Returns the function name for a raw program entry, `"unknown"` if it
    /// is not a declared function.
    #[inline]
    pub const fn name_by_raw(raw: i32) -> &'static str {
        if let Some(func) = Self::from_raw(raw) {
            func.name()
        } else {
            "unknown"
        }
    }

    /// Returns the code as a `u8`.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the code in the signed program representation.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0 as i32
    }

    /// Returns `true` for the power family (`power`, `rpower`, `cvpower`,
    /// `vcpower`), which the degree analyser and the differentiator treat
    /// as one function with different operand conventions.
    #[inline]
    pub const fn is_power_family(&self) -> bool {
        matches!(
            *self,
            FuncCode::POWER | FuncCode::RPOWER | FuncCode::CVPOWER | FuncCode::VCPOWER
        )
    }

    /// Returns `true` for the piecewise-constant functions whose derivative
    /// is identically zero almost everywhere (`trunc`, `floor`, `ceil`,
    /// `round`, `sign`).
    #[inline]
    pub const fn is_locally_constant(&self) -> bool {
        matches!(
            *self,
            FuncCode::TRUNC
                | FuncCode::FLOOR
                | FuncCode::CEIL
                | FuncCode::ROUND
                | FuncCode::SIGN
        )
    }
}

impl PartialEq<u8> for FuncCode {
    fn eq(&self, other: &u8) -> bool {
        self.get().eq(other)
    }
}

macro_rules! func_codes {
    ($($val:literal => $name:ident => $str:literal;)*) => {
        $(
            #[doc = concat!("The `", $str, "` function code (", stringify!($val), ").")]
            pub const $name: u8 = $val;
        )*
        impl FuncCode {$(
            #[doc = concat!("The `", $str, "` function code (", stringify!($val), ").")]
            pub const $name: Self = Self($val);
        )*}

        /// Number of declared function codes.
        pub const FUNC_COUNT: usize = 0 $(+ { let _ = $val; 1 })*;

        /// Maps each function code to its printable name.
        pub static FUNC_NAMES: [&str; FUNC_COUNT] = {
            let mut map = [""; FUNC_COUNT];
            let mut prev: u8 = 0;
            $(
                let val: u8 = $val;
                assert!(val == 0 || val > prev, "function codes must be sorted");
                prev = val;
                map[$val] = $str;
            )*
            let _ = prev;
            map
        };
    };
}

// Numbering shared with the front end; never reorder.
func_codes! {
    0   => MAPVAL          => "mapval";
    1   => CEIL            => "ceil";
    2   => FLOOR           => "floor";
    3   => ROUND           => "round";
    4   => MOD             => "mod";
    5   => TRUNC           => "trunc";
    6   => SIGN            => "sign";
    7   => MIN             => "min";
    8   => MAX             => "max";
    9   => SQR             => "sqr";
    10  => EXP             => "exp";
    11  => LOG             => "log";
    12  => LOG10           => "log10";
    13  => SQRT            => "sqrt";
    14  => ABS             => "abs";
    15  => COS             => "cos";
    16  => SIN             => "sin";
    17  => ARCTAN          => "arctan";
    18  => ERF             => "erf";
    19  => DUNFM           => "dunfm";
    20  => DNORM           => "dnorm";
    21  => POWER           => "power";
    22  => JDATE           => "jdate";
    23  => JTIME           => "jtime";
    24  => JSTART          => "jstart";
    25  => JNOW            => "jnow";
    26  => ERROR           => "error";
    27  => GYEAR           => "gyear";
    28  => GMONTH          => "gmonth";
    29  => GDAY            => "gday";
    30  => GDOW            => "gdow";
    31  => GLEAP           => "gleap";
    32  => GHOUR           => "ghour";
    33  => GMINUTE         => "gminute";
    34  => GSECOND         => "gsecond";
    35  => CURSEED         => "curseed";
    36  => TIMEST          => "timest";
    37  => TIMECO          => "timeco";
    38  => TIMEEX          => "timeex";
    39  => TIMECL          => "timecl";
    40  => FRAC            => "frac";
    41  => ERRORL          => "errorl";
    42  => HEAPS           => "heaps";
    43  => FACT            => "fact";
    44  => UNFMI           => "unfmi";
    45  => PI              => "pi";
    46  => NCPF            => "ncpf";
    47  => NCPCM           => "ncpcm";
    48  => ENTROPY         => "entropy";
    49  => SIGMOID         => "sigmoid";
    50  => LOG2            => "log2";
    51  => BOOLNOT         => "boolnot";
    52  => BOOLAND         => "booland";
    53  => BOOLOR          => "boolor";
    54  => BOOLXOR         => "boolxor";
    55  => BOOLIMP         => "boolimp";
    56  => BOOLEQV         => "booleqv";
    57  => RELOPEQ         => "relopeq";
    58  => RELOPGT         => "relopgt";
    59  => RELOPGE         => "relopge";
    60  => RELOPLT         => "reloplt";
    61  => RELOPLE         => "relople";
    62  => RELOPNE         => "relopne";
    63  => IFTHEN          => "ifthen";
    64  => RPOWER          => "rpower";
    65  => EDIST           => "edist";
    66  => DIV             => "div";
    67  => DIV0            => "div0";
    68  => SLLOG10         => "sllog10";
    69  => SQLOG10         => "sqlog10";
    70  => SLEXP           => "slexp";
    71  => SQEXP           => "sqexp";
    72  => SLREC           => "slrec";
    73  => SQREC           => "sqrec";
    74  => CVPOWER         => "cvpower";
    75  => VCPOWER         => "vcpower";
    76  => CENTROPY        => "centropy";
    77  => GMILLISEC       => "gmillisec";
    78  => MAXERROR        => "maxerror";
    79  => TIMEEL          => "timeel";
    80  => GAMMA           => "gamma";
    81  => LOGGAMMA        => "loggamma";
    82  => BETA            => "beta";
    83  => LOGBETA         => "logbeta";
    84  => GAMMAREG        => "gammareg";
    85  => BETAREG         => "betareg";
    86  => SINH            => "sinh";
    87  => COSH            => "cosh";
    88  => TANH            => "tanh";
    89  => MATHLASTRC      => "mathlastrc";
    90  => MATHLASTEC      => "mathlastec";
    91  => MATHOVAL        => "mathoval";
    92  => SIGNPOWER       => "signpower";
    93  => HANDLE          => "handle";
    94  => NCPVUSIN        => "ncpvusin";
    95  => NCPVUPOW        => "ncpvupow";
    96  => BINOMIAL        => "binomial";
    97  => REHANDLE        => "rehandle";
    98  => GAMSVER         => "gamsver";
    99  => DELHANDLE       => "delhandle";
    100 => TAN             => "tan";
    101 => ARCCOS          => "arccos";
    102 => ARCSIN          => "arcsin";
    103 => ARCTAN2         => "arctan2";
    104 => SLEEP           => "sleep";
    105 => HEAPF           => "heapf";
    106 => COHANDLE        => "cohandle";
    107 => GAMSREL         => "gamsrel";
    108 => POLY            => "poly";
    109 => LICENSESTATUS   => "licensestatus";
    110 => LICENSELEVEL    => "licenselevel";
    111 => HEAPLIMIT       => "heaplimit";
    112 => LINEAR          => "linear";
    113 => TRIANGLE        => "triangle";
    114 => FORCEERROR      => "forceerror";
    115 => FORCEERRORCOUNT => "forceerrorcount";
    116 => RANDBINOMIAL    => "randbinomial";
    117 => JOBHANDLE       => "jobhandle";
    118 => JOBSTATUS       => "jobstatus";
    119 => JOBKILL         => "jobkill";
    120 => JOBTERMINATE    => "jobterminate";
    121 => NUMCORES        => "numcores";
    122 => EMBEDDEDHANDLE  => "embeddedhandle";
    123 => PLATFORMCODE    => "platformcode";
    124 => LOGIT           => "logit";
    125 => LSEMAX          => "lsemax";
    126 => LSEMAXSC        => "lsemaxsc";
    127 => LSEMIN          => "lsemin";
    128 => LSEMINSC        => "lseminsc";
    129 => DUMMY           => "dummy";
}
