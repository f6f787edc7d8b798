// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! KNXnet/IP service type codes (header `service_type` field).

pub const SEARCH_REQUEST: u16 = 0x0201;
pub const SEARCH_RESPONSE: u16 = 0x0202;
pub const DESCRIPTION_REQUEST: u16 = 0x0203;
pub const DESCRIPTION_RESPONSE: u16 = 0x0204;
pub const CONNECT_REQUEST: u16 = 0x0205;
pub const CONNECT_RESPONSE: u16 = 0x0206;
pub const CONNECTIONSTATE_REQUEST: u16 = 0x0207;
pub const CONNECTIONSTATE_RESPONSE: u16 = 0x0208;
pub const DISCONNECT_REQUEST: u16 = 0x0209;
pub const DISCONNECT_RESPONSE: u16 = 0x020A;
pub const SEARCH_REQUEST_EXTENDED: u16 = 0x020B;
pub const SEARCH_RESPONSE_EXTENDED: u16 = 0x020C;

pub const DEVICE_CONFIGURATION_REQUEST: u16 = 0x0310;
pub const DEVICE_CONFIGURATION_ACK: u16 = 0x0311;

pub const TUNNELLING_REQUEST: u16 = 0x0420;
pub const TUNNELLING_ACK: u16 = 0x0421;
pub const TUNNELLING_FEATURE_GET: u16 = 0x0422;
pub const TUNNELLING_FEATURE_RESPONSE: u16 = 0x0423;
pub const TUNNELLING_FEATURE_SET: u16 = 0x0424;
pub const TUNNELLING_FEATURE_INFO: u16 = 0x0425;

pub const ROUTING_INDICATION: u16 = 0x0530;
pub const ROUTING_LOST_MESSAGE: u16 = 0x0531;
pub const ROUTING_BUSY: u16 = 0x0532;

pub const SECURE_WRAPPER: u16 = 0x0950;
pub const SESSION_REQUEST: u16 = 0x0951;
pub const SESSION_RESPONSE: u16 = 0x0952;
pub const SESSION_AUTHENTICATE: u16 = 0x0953;
pub const SESSION_STATUS: u16 = 0x0954;
pub const TIMER_NOTIFY: u16 = 0x0955;

/// Connect/Disconnect/ConnectionState status codes (KNX 03/08/01 §7.8).
pub const E_NO_ERROR: u8 = 0x00;
pub const E_HOST_PROTOCOL_TYPE: u8 = 0x01;
pub const E_VERSION_NOT_SUPPORTED: u8 = 0x02;
pub const E_SEQUENCE_NUMBER: u8 = 0x04;
pub const E_CONNECTION_ID: u8 = 0x21;
pub const E_CONNECTION_TYPE: u8 = 0x22;
pub const E_CONNECTION_OPTION: u8 = 0x23;
pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;
pub const E_DATA_CONNECTION: u8 = 0x26;
pub const E_KNX_CONNECTION: u8 = 0x27;
pub const E_TUNNELLING_LAYER: u8 = 0x29;

/// Secure session status codes.
pub const STATUS_AUTHENTICATION_SUCCESS: u8 = 0x00;
pub const STATUS_CLOSE: u8 = 0x01;
pub const STATUS_KEEPALIVE: u8 = 0x02;
pub const STATUS_UNAUTHENTICATED: u8 = 0x03;
pub const STATUS_TIMEOUT: u8 = 0x04;
pub const STATUS_AUTHENTICATION_FAILED: u8 = 0x05;
