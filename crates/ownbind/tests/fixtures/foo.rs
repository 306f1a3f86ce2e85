// Declaration catalog used by the integration tests. Read with syn only;
// never compiled.

extern "C" {
    fn print_something(message: *const c_char) -> i32;

    #[ownbind("name=get_int")]
    fn get_int_from_string(from_string: *const c_char, multiplier: i32) -> i32;

    /// -#- name=get_int -#-
    fn get_int_from_float(from_float: f64) -> i32;
}

/// -#- automatic_type_narrowing=True -#-
trait Foo {
    fn get_datum(&self) -> String;
    fn set_datum(&mut self, datum: String);
    fn is_initialized(&self) -> bool;
}

extern "C" {
    fn function_that_takes_foo(foo: Foo);
    fn function_that_returns_foo() -> Foo;

    #[ownbind("@return(caller_owns_return=true)")]
    fn get_hidden_subclass_pointer() -> *mut Foo;
}

/// -#- incref_method=Ref; decref_method=Unref; peekref_method=GetReferenceCount -#-
trait Zbr {
    fn get_datum(&self) -> String;
    fn Ref(&mut self);
    fn Unref(&mut self);
    fn GetReferenceCount(&self) -> i32;
    fn get_int(&mut self, x: i32) -> i32;
}

extern "C" {
    #[ownbind("@zbr(transfer_ownership=true)")]
    fn store_zbr(zbr: *mut Zbr);
    fn invoke_zbr(x: i32) -> i32;
    fn delete_stored_zbr();
}

struct Foobar;

trait SomeObject {
    fn get_prefix(&self) -> String;

    #[ownbind("@message(direction=inout)")]
    fn set_string_by_ref(&mut self, message: &mut String);

    fn peek_foo(&self, foo: &Foo);

    #[ownbind("@foo(direction=out)")]
    fn get_foo_by_ref(&self, foo: &mut Foo);

    #[ownbind("@foo(transfer_ownership=true)")]
    fn set_foo_ptr(&mut self, foo: *mut Foo);

    #[ownbind("@foo(transfer_ownership=false)")]
    fn set_foo_shared_ptr(&mut self, foo: *mut Foo);

    fn get_foo_value(&mut self) -> Foo;

    #[ownbind("@return(caller_owns_return=false)")]
    fn get_foo_shared_ptr(&mut self) -> *mut Foo;

    #[ownbind("@return(caller_owns_return=true)")]
    fn get_foo_ptr(&mut self) -> *mut Foo;

    /// Returns a new reference.
    #[ownbind("@return(caller_owns_return=true)")]
    fn get_zbr(&mut self) -> *mut Zbr;

    /// Returns the held object without a new reference.
    #[ownbind("@return(caller_owns_return=false)")]
    fn peek_zbr(&mut self) -> *mut Zbr;

    #[ownbind("@zbr(transfer_ownership=true)")]
    fn set_zbr_transfer(&mut self, zbr: *mut Zbr);

    #[ownbind("@zbr(transfer_ownership=false)")]
    fn set_zbr_shared(&mut self, zbr: *mut Zbr);

    fn get_zbr_pholder(&mut self) -> PointerHolder<Zbr>;
    fn set_zbr_pholder(&mut self, zbr: PointerHolder<Zbr>);

    /// -#- @return(custodian=0) -#-
    fn get_foobar_with_self_as_custodian(&mut self) -> *mut Foobar;

    /// -#- @return(custodian=1) -#-
    fn get_foobar_with_other_as_custodian(&mut self, other: *const SomeObject) -> *mut Foobar;

    /// -#- @foobar(custodian=0) -#-
    fn set_foobar_with_self_as_custodian(&mut self, foobar: *mut Foobar);
}

extern "C" {
    /// A function that will appear as a method of SomeObject
    #[ownbind("as_method=get_something_prefixed; of_class=SomeObject")]
    #[ownbind("@obj(transfer_ownership=false)")]
    fn some_object_get_something_prefixed(obj: *const SomeObject, something: String) -> String;

    #[ownbind("as_method=ref_get_something_prefixed; of_class=SomeObject")]
    fn some_object_ref_get_something_prefixed(obj: &SomeObject, something: String) -> String;

    #[ownbind("@obj(transfer_ownership=true)")]
    fn store_some_object(obj: *mut SomeObject);

    fn invoke_some_object_get_prefix() -> String;

    #[ownbind("@return(caller_owns_return=true)")]
    fn take_some_object() -> *mut SomeObject;

    fn delete_some_object();

    #[ownbind("@return(custodian=1)")]
    fn get_foobar_with_other_as_custodian(other: *const SomeObject) -> *mut Foobar;

    #[ownbind("@return(caller_owns_return=true)")]
    fn create_new_foobar() -> *mut Foobar;

    #[ownbind("@foobar(custodian=2)")]
    fn set_foobar_with_other_as_custodian(foobar: *mut Foobar, other: *const SomeObject);

    #[ownbind("@foobar(custodian=-1); @return(caller_owns_return=true)")]
    fn set_foobar_with_return_as_custodian(foobar: *mut Foobar) -> *mut SomeObject;
}

/// -#- is_singleton=true -#-
struct SingletonClass;

impl SingletonClass {
    #[ownbind("@return(caller_owns_return=true)")]
    fn GetInstance() -> *mut SingletonClass {}
}

struct InterfaceId;

extern "C" {
    fn make_interface_id() -> InterfaceId;

    #[ownbind("ignore")]
    fn make_object_interface_id() -> InterfaceId;
}
