use crate::jvm::class_file::Version;
use crate::jvm::code::CodeSettings;

/// Options controlling what gets generated
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Class file version of the output
    pub version: Version,

    /// Generate `LineNumberTable` attributes
    pub line_numbers: bool,

    /// Generate `LocalVariableTable` attributes (and keep locals holding constants)
    pub local_variables: bool,

    /// Generate the `SourceFile` attribute
    pub source_file: bool,

    /// Finalizers estimated to be more complex than this get compiled once, as a subroutine
    /// called with `jsr`, instead of being duplicated at every exit. Only applies to versions
    /// without stack map frames, and `0` means finalizers are always subroutines there.
    pub finalizer_inline_limit: usize,
}

impl Settings {
    pub fn new(version: Version) -> Settings {
        Settings {
            version,
            ..Settings::default()
        }
    }

    /// Does the class file version call for `StackMapTable`?
    pub fn emit_stack_maps(&self) -> bool {
        self.version >= Version::JAVA6
    }

    /// Are `jsr` and `ret` allowed by the class file version?
    pub fn allows_subroutines(&self) -> bool {
        self.version < Version::JAVA7
    }

    /// Should a `finally` block of the given complexity become a subroutine?
    pub fn use_subroutine(&self, complexity: usize) -> bool {
        self.allows_subroutines()
            && !self.emit_stack_maps()
            && (self.finalizer_inline_limit == 0 || complexity > self.finalizer_inline_limit)
    }

    /// Are private methods called with `invokevirtual` (nestmates)?
    pub fn virtual_private_calls(&self) -> bool {
        self.version >= Version::JAVA11
    }

    /// Are class literals loadable with `ldc`?
    pub fn ldc_class_literals(&self) -> bool {
        self.version >= Version::JAVA5
    }

    pub fn code_settings(&self) -> CodeSettings {
        CodeSettings {
            emit_stack_maps: self.emit_stack_maps(),
            line_numbers: self.line_numbers,
            local_variables: self.local_variables,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            version: Version::JAVA8,
            line_numbers: true,
            local_variables: false,
            source_file: true,
            finalizer_inline_limit: 50,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subroutines_only_without_stack_maps() {
        let mut settings = Settings::new(Version::JAVA5);
        assert!(!settings.emit_stack_maps());
        assert!(!settings.use_subroutine(10));
        assert!(settings.use_subroutine(51));
        settings.finalizer_inline_limit = 0;
        assert!(settings.use_subroutine(1));

        let settings = Settings::new(Version::JAVA6);
        assert!(settings.emit_stack_maps());
        assert!(settings.allows_subroutines());
        assert!(!settings.use_subroutine(1000));
        assert!(!Settings::default().allows_subroutines());
    }
}
