//! IANA-registered code points.

use std::{fmt, str::FromStr};

/// Define a code point newtype with named constants.
macro_rules! code_points {
    (
        $(#[$attr:meta])*
        $vis:vis struct $ty:ident($int:ty), $unknown:literal;
        $( $(#[$cattr:meta])* $name:ident = $value:literal, $text:literal; )*
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $ty(pub $int);

        impl $ty {
            $( $(#[$cattr])* pub const $name: Self = Self($value); )*

            /// The mnemonic of this code point, if it has one.
            pub const fn mnemonic(&self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some($text), )*
                    _ => None,
                }
            }

            /// The numeric value.
            pub const fn to_int(self) -> $int {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.mnemonic() {
                    Some(text) => f.write_str(text),
                    None => write!(f, concat!($unknown, "{}"), self.0),
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownMnemonic;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok(Self::$name);
                    }
                )*
                s.get(..$unknown.len())
                    .filter(|p| p.eq_ignore_ascii_case($unknown))
                    .and_then(|_| s[$unknown.len()..].parse().ok())
                    .map(Self)
                    .ok_or(UnknownMnemonic)
            }
        }
    };
}

code_points! {
    /// A resource record type.
    pub struct RType(u16), "TYPE";

    A = 1, "A";
    NS = 2, "NS";
    CNAME = 5, "CNAME";
    SOA = 6, "SOA";
    PTR = 12, "PTR";
    MX = 15, "MX";
    TXT = 16, "TXT";
    AAAA = 28, "AAAA";
    SRV = 33, "SRV";
    OPT = 41, "OPT";
    TSIG = 250, "TSIG";
    IXFR = 251, "IXFR";
    AXFR = 252, "AXFR";
    ANY = 255, "ANY";
}

code_points! {
    /// A resource record class.
    pub struct Class(u16), "CLASS";

    IN = 1, "IN";
    CH = 3, "CH";
    /// Used by dynamic updates to delete a specific record.
    NONE = 254, "NONE";
    /// Used by dynamic updates to delete record sets, and by TSIG.
    ANY = 255, "ANY";
}

code_points! {
    /// A message operation code.
    pub struct Opcode(u8), "OPCODE";

    QUERY = 0, "QUERY";
    NOTIFY = 4, "NOTIFY";
    UPDATE = 5, "UPDATE";
}

impl Default for Opcode {
    fn default() -> Self {
        Self::QUERY
    }
}

code_points! {
    /// A response code.
    ///
    /// Values above 15 only appear in the error field of TSIG records.
    pub struct Rcode(u16), "RCODE";

    NOERROR = 0, "NOERROR";
    FORMERR = 1, "FORMERR";
    SERVFAIL = 2, "SERVFAIL";
    NXDOMAIN = 3, "NXDOMAIN";
    NOTIMP = 4, "NOTIMP";
    REFUSED = 5, "REFUSED";
    YXDOMAIN = 6, "YXDOMAIN";
    YXRRSET = 7, "YXRRSET";
    NXRRSET = 8, "NXRRSET";
    NOTAUTH = 9, "NOTAUTH";
    NOTZONE = 10, "NOTZONE";
    BADSIG = 16, "BADSIG";
    BADKEY = 17, "BADKEY";
    BADTIME = 18, "BADTIME";
    BADTRUNC = 22, "BADTRUNC";
}

impl Rcode {
    /// Whether this code signals success.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl Default for Rcode {
    fn default() -> Self {
        Self::NOERROR
    }
}

//----------- UnknownMnemonic --------------------------------------------------

/// A mnemonic that does not name a known code point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownMnemonic;

impl std::error::Error for UnknownMnemonic {}

impl fmt::Display for UnknownMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown mnemonic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics() {
        assert_eq!(RType::MX.to_string(), "MX");
        assert_eq!(RType(65280).to_string(), "TYPE65280");
        assert_eq!("cname".parse::<RType>(), Ok(RType::CNAME));
        assert_eq!("TYPE99".parse::<RType>(), Ok(RType(99)));
        assert_eq!("BOGUS".parse::<RType>(), Err(UnknownMnemonic));

        assert_eq!(Rcode::BADKEY.to_string(), "BADKEY");
        assert_eq!(Rcode(12).to_string(), "RCODE12");
        assert_eq!(Class::ANY.to_string(), "ANY");
        assert_eq!(Opcode::UPDATE.to_string(), "UPDATE");
    }
}
