//! Live registry and COM runtime, via `windows-sys`.

use std::ffi::{OsStr, c_void};
use std::os::windows::ffi::OsStrExt;
use std::ptr::{self, NonNull};

use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS};
use windows_sys::Win32::System::Com::{
    CLSCTX, CLSCTX_INPROC_SERVER, CLSCTX_LOCAL_SERVER, CLSIDFromProgID, COINIT_APARTMENTTHREADED,
    COINIT_MULTITHREADED, CoCreateInstance, CoGetClassObject, CoInitializeEx, CoUninitialize,
    MSHCTX_INPROC, MSHLFLAGS_NORMAL,
};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_CLASSES_ROOT, KEY_READ, REG_ROUTINE_FLAGS, RRF_NOEXPAND, RRF_RT_REG_EXPAND_SZ,
    RRF_RT_REG_SZ, RegCloseKey, RegGetValueW, RegOpenKeyExW,
};
use windows_sys::core::{GUID, HRESULT};

use crate::backend::{
    ActivationContext, Capability, ComponentRuntime, ContextToken, HResult, MarshalContext,
    MarshalFlags, RegStatus, RegistryLookup,
};
use crate::guid::{ClassId, Guid, IID_ICLASS_FACTORY, IID_IUNKNOWN, InterfaceId};
use crate::model::ThreadingModel;

fn to_wide_null(value: &str) -> Vec<u16> {
    let mut wide: Vec<u16> = OsStr::new(value).encode_wide().collect();
    wide.push(0);
    wide
}

fn to_win(guid: &Guid) -> GUID {
    GUID {
        data1: guid.data1,
        data2: guid.data2,
        data3: guid.data3,
        data4: guid.data4,
    }
}

fn from_win(guid: &GUID) -> Guid {
    Guid {
        data1: guid.data1,
        data2: guid.data2,
        data3: guid.data3,
        data4: guid.data4,
    }
}

fn check(hr: HRESULT) -> Result<(), HResult> {
    if hr < 0 { Err(HResult(hr)) } else { Ok(()) }
}

/// `HKEY_CLASSES_ROOT`, merged view of machine and user registrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRegistry;

struct KeyHandle(HKEY);

impl Drop for KeyHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

/// Default values (module paths) are commonly `REG_EXPAND_SZ`; they are read
/// unexpanded.
fn value_flags(value_name: Option<&str>) -> REG_ROUTINE_FLAGS {
    match value_name {
        None => RRF_RT_REG_SZ | RRF_RT_REG_EXPAND_SZ | RRF_NOEXPAND,
        Some(_) => RRF_RT_REG_SZ,
    }
}

impl RegistryLookup for NativeRegistry {
    fn get(&self, key_path: &str, value_name: Option<&str>) -> Result<Option<String>, RegStatus> {
        let key = to_wide_null(key_path);
        let name = value_name.map(to_wide_null);
        let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());
        let flags = value_flags(value_name);

        let mut num_bytes = 0u32;
        let status = unsafe {
            RegGetValueW(
                HKEY_CLASSES_ROOT,
                key.as_ptr(),
                name_ptr,
                flags,
                ptr::null_mut(),
                ptr::null_mut(),
                &raw mut num_bytes,
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(RegStatus(status));
        }

        let mut buf = vec![0u16; (num_bytes as usize).div_ceil(2)];
        let status = unsafe {
            RegGetValueW(
                HKEY_CLASSES_ROOT,
                key.as_ptr(),
                name_ptr,
                flags,
                ptr::null_mut(),
                buf.as_mut_ptr().cast(),
                &raw mut num_bytes,
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(RegStatus(status));
        }

        let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
        Ok(Some(String::from_utf16_lossy(&buf[..len])))
    }

    fn key_exists(&self, key_path: &str) -> Result<bool, RegStatus> {
        let key = to_wide_null(key_path);
        let mut raw: HKEY = ptr::null_mut();
        let status =
            unsafe { RegOpenKeyExW(HKEY_CLASSES_ROOT, key.as_ptr(), 0, KEY_READ, &raw mut raw) };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(false);
        }
        if status != ERROR_SUCCESS {
            return Err(RegStatus(status));
        }
        let _key = KeyHandle(raw);
        Ok(true)
    }
}

#[repr(C)]
#[allow(dead_code)]
struct IUnknownVtbl {
    query_interface:
        unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    release: unsafe extern "system" fn(*mut c_void) -> u32,
}

#[repr(C)]
#[allow(dead_code)]
struct IMarshalVtbl {
    base: IUnknownVtbl,
    get_unmarshal_class: unsafe extern "system" fn(
        *mut c_void,
        *const GUID,
        *const c_void,
        u32,
        *const c_void,
        u32,
        *mut GUID,
    ) -> HRESULT,
}

/// An owned COM interface pointer; released on drop.
pub struct ComPtr(NonNull<c_void>);

impl ComPtr {
    /// # Safety
    /// `raw` must be null or a COM interface pointer whose reference the
    /// caller owns.
    unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// # Safety
    /// The object's vtable must start with a `T`.
    unsafe fn vtbl<T>(&self) -> &T {
        unsafe { &**self.0.as_ptr().cast::<*const T>() }
    }

    fn query_interface(&self, iid: &InterfaceId) -> Result<Option<ComPtr>, HResult> {
        let iid = to_win(iid);
        let mut out: *mut c_void = ptr::null_mut();
        let hr = unsafe {
            (self.vtbl::<IUnknownVtbl>().query_interface)(self.0.as_ptr(), &iid, &raw mut out)
        };
        match check(hr) {
            Ok(()) => Ok(unsafe { ComPtr::from_raw(out) }),
            Err(code) if code.is_no_interface() => Ok(None),
            Err(code) => Err(code),
        }
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        unsafe {
            (self.vtbl::<IUnknownVtbl>().release)(self.0.as_ptr());
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

fn clsctx(context: ActivationContext) -> CLSCTX {
    match context {
        ActivationContext::InProcServer => CLSCTX_INPROC_SERVER,
        ActivationContext::LocalServer => CLSCTX_LOCAL_SERVER,
    }
}

impl ComponentRuntime for NativeRuntime {
    type Object = ComPtr;

    fn enter_context(&self, model: ThreadingModel) -> Result<ContextToken, HResult> {
        let coinit = if model == ThreadingModel::SingleThreaded {
            COINIT_APARTMENTTHREADED
        } else {
            COINIT_MULTITHREADED
        };
        // S_FALSE (already initialized, same model) still needs a matching
        // CoUninitialize, so any success yields a token.
        check(unsafe { CoInitializeEx(ptr::null(), coinit as _) })?;
        Ok(ContextToken { model })
    }

    fn leave_context(&self, _token: ContextToken) {
        unsafe { CoUninitialize() };
    }

    fn create_instance(
        &self,
        clsid: &ClassId,
        context: ActivationContext,
    ) -> Result<ComPtr, HResult> {
        let clsid = to_win(clsid);
        let iid = to_win(&IID_IUNKNOWN);
        let mut out: *mut c_void = ptr::null_mut();
        check(unsafe {
            CoCreateInstance(&clsid, ptr::null_mut(), clsctx(context), &iid, &raw mut out)
        })?;
        unsafe { ComPtr::from_raw(out) }.ok_or(HResult::E_FAIL)
    }

    fn query_capability(
        &self,
        object: &ComPtr,
        capability: Capability,
    ) -> Result<Option<ComPtr>, HResult> {
        object.query_interface(&capability.interface_id())
    }

    fn get_unmarshal_class(
        &self,
        marshal: &ComPtr,
        iid: &InterfaceId,
        context: MarshalContext,
        flags: MarshalFlags,
    ) -> Result<ClassId, HResult> {
        let MarshalContext::InProc = context;
        let MarshalFlags::Normal = flags;
        let iid = to_win(iid);
        let mut out = to_win(&Guid::from_u128(0));
        let hr = unsafe {
            (marshal.vtbl::<IMarshalVtbl>().get_unmarshal_class)(
                marshal.0.as_ptr(),
                &iid,
                ptr::null(),
                MSHCTX_INPROC as u32,
                ptr::null(),
                MSHLFLAGS_NORMAL as u32,
                &raw mut out,
            )
        };
        check(hr)?;
        Ok(from_win(&out))
    }

    fn get_class_factory(
        &self,
        clsid: &ClassId,
        context: ActivationContext,
    ) -> Result<ComPtr, HResult> {
        let clsid = to_win(clsid);
        let iid = to_win(&IID_ICLASS_FACTORY);
        let mut out: *mut c_void = ptr::null_mut();
        check(unsafe {
            CoGetClassObject(&clsid, clsctx(context), ptr::null(), &iid, &raw mut out)
        })?;
        unsafe { ComPtr::from_raw(out) }.ok_or(HResult::E_FAIL)
    }

    fn resolve_prog_id(&self, prog_id: &str) -> Result<ClassId, HResult> {
        let wide = to_wide_null(prog_id);
        let mut out = to_win(&Guid::from_u128(0));
        check(unsafe { CLSIDFromProgID(wide.as_ptr(), &raw mut out) })?;
        Ok(from_win(&out))
    }
}
